//! Link error types.

use rmserial_protocol::FrameError;
use thiserror::Error;

/// Link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("read timeout")]
    Timeout,

    #[error("reader is owned by a running read loop")]
    ReaderBusy,
}

impl LinkError {
    /// Returns whether this error ends the current session.
    ///
    /// Transport errors are not retried here; the owner of the channel decides
    /// whether to reopen it. Protocol errors only mean a frame was dropped.
    pub fn is_transport(&self) -> bool {
        matches!(self, LinkError::Io(_) | LinkError::ConnectionClosed)
    }
}
