//! Online throughput sampling for adaptive streaming.
//!
//! [`SpeedSampler`] keeps a rolling one-second window of received bytes and
//! reports instantaneous, last-second and whole-session rates in KiB/s.
//! [`normalize`] snaps a measured rate onto a fixed ladder so that consumers
//! (stash sizing, ranged chunk sizing) react to discrete steps instead of
//! chasing every fluctuation.

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

/// Ladder used to normalize measured download speed, in KiB/s.
pub const SPEED_LADDER_KBPS: [u32; 11] = [
    64, 128, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096,
];

/// Ladder used by the ranged transport for sub-request sizing, in KiB.
pub const CHUNK_LADDER_KB: [u32; 14] = [
    128, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096, 5120, 6144, 7168, 8192,
];

/// Snap `value` onto `ladder`: the greatest entry `<= value`, clamped to the
/// first entry for smaller inputs. A value equal to the top entry returns the
/// top entry.
pub fn normalize(ladder: &[u32], value: f64) -> u32 {
    debug_assert!(!ladder.is_empty());
    let idx = ladder.partition_point(|&entry| f64::from(entry) <= value);
    if idx == 0 { ladder[0] } else { ladder[idx - 1] }
}

const WINDOW: Duration = Duration::from_millis(1000);

/// Threshold after which the in-progress window is considered representative
/// enough to stand in for a not-yet-rotated last-second reading.
const SETTLE: Duration = Duration::from_millis(500);

/// Rolling byte-rate sampler with millisecond resolution.
///
/// `add_bytes` accumulates into the current window; once the window exceeds
/// one second it rotates into `last_second_kbps`. The rate getters take
/// `&mut self` because reading implicitly rotates the window.
#[derive(Debug, Default)]
pub struct SpeedSampler {
    first_checkpoint: Option<Instant>,
    last_checkpoint: Option<Instant>,
    interval_bytes: u64,
    total_bytes: u64,
    last_second_bytes: u64,
}

impl SpeedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all accumulated state, as if freshly constructed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `bytes` received now.
    pub fn add_bytes(&mut self, bytes: u64) {
        self.add_bytes_at(bytes, Instant::now());
    }

    /// Rate of the current (possibly partial) window, in KiB/s.
    pub fn current_kbps(&mut self) -> f64 {
        self.current_kbps_at(Instant::now())
    }

    /// Rate of the last completed one-second window, in KiB/s.
    ///
    /// Falls back to [`current_kbps`](Self::current_kbps) once the open
    /// window is at least 500 ms old, and reports `0.0` while the sampler
    /// has not seen enough traffic to know.
    pub fn last_second_kbps(&mut self) -> f64 {
        self.last_second_kbps_at(Instant::now())
    }

    /// Whole-session average rate, in KiB/s.
    pub fn average_kbps(&mut self) -> f64 {
        self.average_kbps_at(Instant::now())
    }

    fn add_bytes_at(&mut self, bytes: u64, now: Instant) {
        match self.last_checkpoint {
            None => {
                self.first_checkpoint = Some(now);
                self.last_checkpoint = Some(now);
                self.interval_bytes += bytes;
                self.total_bytes += bytes;
            }
            Some(last) if now.duration_since(last) < WINDOW => {
                self.interval_bytes += bytes;
                self.total_bytes += bytes;
            }
            Some(_) => {
                self.last_second_bytes = self.interval_bytes;
                self.interval_bytes = bytes;
                self.total_bytes += bytes;
                self.last_checkpoint = Some(now);
            }
        }
    }

    fn current_kbps_at(&mut self, now: Instant) -> f64 {
        self.add_bytes_at(0, now);

        let last = self.last_checkpoint.unwrap_or(now);
        let elapsed_ms = now.duration_since(last).as_millis().max(1) as f64;
        (self.interval_bytes as f64) * 1000.0 / elapsed_ms / 1024.0
    }

    fn last_second_kbps_at(&mut self, now: Instant) -> f64 {
        self.add_bytes_at(0, now);

        if self.last_second_bytes != 0 {
            return self.last_second_bytes as f64 / 1024.0;
        }

        let last = self.last_checkpoint.unwrap_or(now);
        if now.duration_since(last) >= SETTLE {
            self.current_kbps_at(now)
        } else {
            0.0
        }
    }

    fn average_kbps_at(&mut self, now: Instant) -> f64 {
        let Some(first) = self.first_checkpoint else {
            return 0.0;
        };
        let elapsed_ms = now.duration_since(first).as_millis().max(1) as f64;
        (self.total_bytes as f64) * 1000.0 / elapsed_ms / 1024.0
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(63.0, 64)]
    #[case(64.0, 64)]
    #[case(65.0, 64)]
    #[case(383.0, 256)]
    #[case(384.0, 384)]
    #[case(385.0, 384)]
    #[case(5000.0, 4096)]
    fn speed_ladder_normalization(#[case] input: f64, #[case] expected: u32) {
        assert_eq!(normalize(&SPEED_LADDER_KBPS, input), expected);
    }

    #[rstest]
    #[case(0.0, 128)]
    #[case(128.0, 128)]
    #[case(500.0, 384)]
    #[case(8192.0, 8192)]
    #[case(20000.0, 8192)]
    fn chunk_ladder_normalization(#[case] input: f64, #[case] expected: u32) {
        assert_eq!(normalize(&CHUNK_LADDER_KB, input), expected);
    }

    #[test]
    fn window_rotates_after_one_second() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::new();

        sampler.add_bytes_at(100 * 1024, t0);
        sampler.add_bytes_at(100 * 1024, t0 + Duration::from_millis(400));
        assert_eq!(sampler.last_second_bytes, 0);

        // Crossing the window boundary rotates the accumulated interval.
        sampler.add_bytes_at(50 * 1024, t0 + Duration::from_millis(1200));
        assert_eq!(sampler.last_second_bytes, 200 * 1024);
        assert_eq!(sampler.interval_bytes, 50 * 1024);

        let kbps = sampler.last_second_kbps_at(t0 + Duration::from_millis(1300));
        assert!((kbps - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn last_second_falls_back_to_current_after_settle() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::new();

        sampler.add_bytes_at(512 * 1024, t0);

        // Window not rotated and younger than 500 ms: unknown.
        assert_eq!(sampler.last_second_kbps_at(t0 + Duration::from_millis(200)), 0.0);

        // Past the settle threshold the partial window is used:
        // 512 KiB over 800 ms = 640 KiB/s.
        let kbps = sampler.last_second_kbps_at(t0 + Duration::from_millis(800));
        assert!((kbps - 640.0).abs() < 1.0);
    }

    #[test]
    fn average_covers_the_whole_session() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::new();

        sampler.add_bytes_at(1024 * 1024, t0);
        sampler.add_bytes_at(1024 * 1024, t0 + Duration::from_millis(1000));

        // 2 MiB over 2 s = 1024 KiB/s.
        let avg = sampler.average_kbps_at(t0 + Duration::from_millis(2000));
        assert!((avg - 1024.0).abs() < 1.0);
    }

    #[test]
    fn reset_clears_all_state() {
        let t0 = Instant::now();
        let mut sampler = SpeedSampler::new();

        sampler.add_bytes_at(4096, t0);
        sampler.add_bytes_at(4096, t0 + Duration::from_millis(1100));
        sampler.reset();

        assert_eq!(sampler.total_bytes, 0);
        assert_eq!(sampler.last_second_bytes, 0);
        assert!(sampler.first_checkpoint.is_none());
        assert_eq!(sampler.last_second_kbps_at(t0 + Duration::from_millis(1200)), 0.0);
    }
}
