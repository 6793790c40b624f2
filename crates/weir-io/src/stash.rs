#![forbid(unsafe_code)]

/// Initial physical buffer capacity: 3 MiB.
pub(crate) const INITIAL_BUFFER_SIZE: usize = 3 * 1024 * 1024;

/// Headroom kept beyond the logical window whenever the buffer grows.
pub(crate) const EXPANSION_HEADROOM: usize = 1024 * 1024;

/// Upper bound for the speed-driven logical window, in KiB.
pub(crate) const MAX_STASH_KB: u32 = 8192;

/// Logical stash window for a measured, ladder-normalized speed in KiB/s.
///
/// Live sessions track the speed directly; on-demand sessions buffer ahead
/// more aggressively once the link is fast enough to afford it.
pub(crate) fn stash_size_kb_for(normalized_kbps: u32, is_live: bool) -> u32 {
    let kb = if is_live || normalized_kbps < 512 {
        normalized_kbps
    } else if normalized_kbps <= 1024 {
        (f64::from(normalized_kbps) * 1.5).floor() as u32
    } else {
        normalized_kbps * 2
    };
    kb.min(MAX_STASH_KB)
}

/// A single contiguous byte region in front of the consumer.
///
/// `buf[0..used]` always holds exactly the resource bytes
/// `[byte_start, byte_start + used)`; the buffer only ever grows.
pub(crate) struct StashBuffer {
    buf: Vec<u8>,
    stash_size: usize,
    used: usize,
    byte_start: u64,
}

impl StashBuffer {
    pub(crate) fn new(stash_initial_size: usize) -> Self {
        Self {
            buf: vec![0; INITIAL_BUFFER_SIZE],
            stash_size: stash_initial_size,
            used: 0,
            byte_start: 0,
        }
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn stash_size(&self) -> usize {
        self.stash_size
    }

    pub(crate) fn set_stash_size(&mut self, size: usize) {
        self.stash_size = size;
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub(crate) fn byte_start(&self) -> u64 {
        self.byte_start
    }

    pub(crate) fn set_byte_start(&mut self, byte_start: u64) {
        self.byte_start = byte_start;
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    pub(crate) fn clear(&mut self) {
        self.used = 0;
        self.byte_start = 0;
    }

    /// Grow the region so it can hold `expected` bytes: double the logical
    /// window until it clears `expected` minus the headroom, add the
    /// headroom, reallocate, carry the held bytes over. Held data and
    /// `byte_start` are unaffected.
    pub(crate) fn expand(&mut self, expected: usize) {
        debug_assert!(self.stash_size > 0);

        let mut new_size = self.stash_size;
        while new_size + EXPANSION_HEADROOM < expected {
            new_size *= 2;
        }
        new_size += EXPANSION_HEADROOM;
        if new_size == self.buf.len() {
            return;
        }

        let mut new_buf = vec![0; new_size];
        new_buf[..self.used].copy_from_slice(&self.buf[..self.used]);
        self.buf = new_buf;
    }

    /// Append `chunk` after the held bytes, growing first when it would not
    /// fit the physical buffer.
    pub(crate) fn append(&mut self, chunk: &[u8]) {
        if self.used + chunk.len() > self.buf.len() {
            self.expand(self.used + chunk.len());
        }
        self.buf[self.used..self.used + chunk.len()].copy_from_slice(chunk);
        self.used += chunk.len();
    }

    /// Replace the held bytes with the unconsumed tail of a dispatched
    /// chunk.
    pub(crate) fn stash_tail(&mut self, tail: &[u8], byte_start: u64) {
        if tail.len() > self.buf.len() {
            self.expand(tail.len());
        }
        self.buf[..tail.len()].copy_from_slice(tail);
        self.used = tail.len();
        self.byte_start = byte_start;
    }

    /// Release `consumed` bytes from the front: compact the remainder to
    /// offset zero and advance `byte_start` accordingly.
    pub(crate) fn release(&mut self, consumed: usize) {
        debug_assert!(consumed <= self.used);
        if consumed == 0 {
            return;
        }
        self.buf.copy_within(consumed..self.used, 0);
        self.used -= consumed;
        self.byte_start += consumed as u64;
    }
}
