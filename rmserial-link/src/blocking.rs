//! Blocking frame I/O over any `std::io` channel.

use crate::config::LinkConfig;
use crate::error::LinkError;
use rmserial_protocol::{Frame, Framer, FramerStats};
use std::io::{ErrorKind, Read, Write};

/// A blocking link that reads and writes frames on a byte channel.
///
/// Reads only need `T: Read` and writes only need `T: Write`, so a half-duplex
/// handle or one side of a cloned serial port works as well as a full channel.
pub struct SerialLink<T> {
    io: T,
    framer: Framer,
    read_buf: Vec<u8>,
}

impl<T> SerialLink<T> {
    /// Creates a link with default configuration.
    pub fn new(io: T) -> Self {
        Self::with_config(io, LinkConfig::default())
    }

    pub fn with_config(io: T, config: LinkConfig) -> Self {
        Self {
            io,
            framer: Framer::with_config(config.framer_config()),
            read_buf: vec![0u8; config.read_buffer_size],
        }
    }

    /// Returns the framer state and counters.
    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    pub fn stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Discards buffered bytes, e.g. after the channel was reopened.
    pub fn reset(&mut self) {
        self.framer.reset();
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: Read> SerialLink<T> {
    /// Blocks until a valid frame arrives.
    ///
    /// Corrupted frames are logged, counted in [`FramerStats`] and skipped.
    /// Returns an error only when the channel fails or reaches end of stream.
    pub fn read_frame(&mut self) -> Result<Frame, LinkError> {
        loop {
            match self.read_event() {
                Ok(frame) => return Ok(frame),
                Err(LinkError::Protocol(e)) => {
                    tracing::warn!(error = %e, "dropping corrupted frame");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Blocks until the framer resolves a frame or a framing error.
    ///
    /// Unlike [`read_frame`](Self::read_frame), corruption is returned as
    /// `LinkError::Protocol` so the caller can count or report it.
    pub fn read_event(&mut self) -> Result<Frame, LinkError> {
        loop {
            if let Some(result) = self.framer.next_frame() {
                return result.map_err(LinkError::from);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<(), LinkError> {
        let n = loop {
            match self.io.read(&mut self.read_buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!("read failed: {}", e);
                    return Err(LinkError::Io(e));
                }
            }
        };

        if n == 0 {
            tracing::debug!("channel closed (0 bytes)");
            return Err(LinkError::ConnectionClosed);
        }

        tracing::trace!(bytes = n, buffered = self.framer.buffered(), "read chunk");
        self.framer.extend(&self.read_buf[..n]);
        Ok(())
    }
}

impl<T: Write> SerialLink<T> {
    /// Encodes `frame` and writes it in full.
    ///
    /// Short writes and interrupted writes are retried until every byte has
    /// been accepted or the channel reports an error.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let encoded = frame.encode()?;
        self.io.write_all(&encoded)?;
        self.io.flush()?;
        tracing::debug!(bytes = encoded.len(), %frame, "frame written");
        Ok(())
    }
}
