#![forbid(unsafe_code)]

use weir_net::LoaderOptions;

use crate::error::{IoError, IoResult};

/// Default logical stash window: 384 KiB.
pub const DEFAULT_STASH_INITIAL_SIZE: usize = 384 * 1024;

/// Session configuration for a [`StreamController`](crate::StreamController).
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Logical stash window the session starts with (and returns to on
    /// seek). Must be non-zero.
    pub stash_initial_size: usize,
    /// When false, every chunk is offered to the consumer as it arrives
    /// instead of being coalesced first.
    pub enable_stash_buffer: bool,
    /// Live sessions size their stash directly from measured speed and
    /// never attempt early-EOF reconnection.
    pub is_live: bool,
    /// Transport configuration, passed to every loader instance.
    pub loader: LoaderOptions,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            stash_initial_size: DEFAULT_STASH_INITIAL_SIZE,
            enable_stash_buffer: true,
            is_live: false,
            loader: LoaderOptions::default(),
        }
    }
}

impl StreamOptions {
    pub fn with_stash_initial_size(mut self, size: usize) -> Self {
        self.stash_initial_size = size;
        self
    }

    pub fn with_stash_buffer_enabled(mut self, enabled: bool) -> Self {
        self.enable_stash_buffer = enabled;
        self
    }

    pub fn with_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    pub fn with_loader(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    pub(crate) fn validate(&self) -> IoResult<()> {
        if self.stash_initial_size == 0 {
            return Err(IoError::InvalidArgument(
                "stash_initial_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stash_size_is_rejected() {
        let options = StreamOptions::default().with_stash_initial_size(0);
        assert!(matches!(
            options.validate(),
            Err(IoError::InvalidArgument(_))
        ));
        assert!(StreamOptions::default().validate().is_ok());
    }
}
