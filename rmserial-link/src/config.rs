//! Link configuration.

use rmserial_protocol::{FramerConfig, DEFAULT_MAX_PAYLOAD};
use std::time::Duration;

/// Default read buffer size (4 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Minimum read buffer size (64 bytes).
pub const MIN_READ_BUFFER_SIZE: usize = 64;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Size of the scratch buffer handed to each read.
    pub read_buffer_size: usize,
    /// Largest payload length accepted from the stream.
    pub max_payload: u16,
    /// Async link only: bounds each `read_frame` call, and in the read loop
    /// each idle period is reported as `LinkError::Timeout`.
    pub read_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_payload: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_payload(mut self, max_payload: u16) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Framer settings derived from this configuration.
    pub fn framer_config(&self) -> FramerConfig {
        FramerConfig::new().with_max_payload(self.max_payload)
    }
}
