//! Async link and callback-driven read loop.
//!
//! The channel is split into independent read and write halves so full-duplex
//! traffic never waits on the other direction. The read half and its framer
//! sit behind one lock: either a single `read_frame` call or the background
//! read loop owns them at any moment, and the framer survives across
//! stop/start cycles.

use crate::config::LinkConfig;
use crate::error::LinkError;
use rmserial_protocol::{Frame, FrameError, Framer, FramerStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Read half of the channel together with the framer that owns its bytes.
struct ReadSide<T> {
    reader: ReadHalf<T>,
    framer: Framer,
    buf: Vec<u8>,
}

impl<T: AsyncRead> ReadSide<T> {
    /// Reads one chunk into the framer.
    async fn fill(&mut self) -> Result<(), LinkError> {
        let n = self.reader.read(&mut self.buf).await?;
        if n == 0 {
            tracing::debug!("channel closed (0 bytes)");
            return Err(LinkError::ConnectionClosed);
        }
        tracing::trace!(bytes = n, buffered = self.framer.buffered(), "read chunk");
        self.framer.extend(&self.buf[..n]);
        Ok(())
    }

    /// Reads one chunk, failing with `Timeout` if none arrives in time.
    ///
    /// A timed-out read is cancelled without consuming bytes.
    async fn fill_within(&mut self, timeout: Option<Duration>) -> Result<(), LinkError> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fill())
                .await
                .map_err(|_| LinkError::Timeout)?,
            None => self.fill().await,
        }
    }

    /// Resolves the next framer result and publishes the counters if they
    /// changed, including steps that only discard bytes.
    fn next_event(
        &mut self,
        stats: &watch::Sender<FramerStats>,
    ) -> Option<Result<Frame, FrameError>> {
        let result = self.framer.next_frame();
        let current = self.framer.stats();
        stats.send_if_modified(|published| {
            if *published == current {
                return false;
            }
            *published = current;
            true
        });
        result
    }

    async fn read_frame(&mut self, stats: &watch::Sender<FramerStats>) -> Result<Frame, LinkError> {
        loop {
            while let Some(result) = self.next_event(stats) {
                match result {
                    Ok(frame) => return Ok(frame),
                    Err(e) => tracing::warn!(error = %e, "dropping corrupted frame"),
                }
            }
            self.fill().await?;
        }
    }
}

/// How a read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Stopped on request; the link can be started again.
    Stopped,
    /// The channel failed or closed; the error went to `on_error`.
    Terminated,
}

/// Handle to a running read loop.
///
/// Dropping the handle stops the loop.
pub struct ReadLoop {
    stop: watch::Sender<bool>,
    handle: JoinHandle<LoopExit>,
}

impl ReadLoop {
    /// Stops the loop and waits for it to finish.
    ///
    /// Once this returns no callback fires again. A read in flight is
    /// cancelled without consuming bytes, and frames not yet dispatched stay
    /// buffered for the next `start`.
    pub async fn stop(self) -> LoopExit {
        let _ = self.stop.send(true);
        self.join().await
    }

    /// Waits for the loop to end on its own.
    pub async fn join(self) -> LoopExit {
        match self.handle.await {
            Ok(exit) => exit,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => LoopExit::Stopped,
        }
    }

    /// Returns whether the loop task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// An async frame link over a duplex byte channel.
pub struct AsyncLink<T> {
    config: LinkConfig,
    reader: Arc<Mutex<ReadSide<T>>>,
    writer: Mutex<Option<WriteHalf<T>>>,
    stats: Arc<watch::Sender<FramerStats>>,
}

impl<T: AsyncRead + AsyncWrite> AsyncLink<T> {
    /// Creates a link with default configuration.
    pub fn new(io: T) -> Self {
        Self::with_config(io, LinkConfig::default())
    }

    pub fn with_config(io: T, config: LinkConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        let (stats, _) = watch::channel(FramerStats::default());
        Self {
            reader: Arc::new(Mutex::new(ReadSide {
                reader: read_half,
                framer: Framer::with_config(config.framer_config()),
                buf: vec![0u8; config.read_buffer_size],
            })),
            writer: Mutex::new(Some(write_half)),
            stats: Arc::new(stats),
            config,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Waits for the next valid frame.
    ///
    /// Corrupted frames are logged and skipped. Fails with `ReaderBusy` while
    /// a read loop is running and with `Timeout` when `read_timeout` elapses;
    /// bytes received before a timeout stay buffered.
    pub async fn read_frame(&self) -> Result<Frame, LinkError> {
        let mut side = self.reader.try_lock().map_err(|_| LinkError::ReaderBusy)?;
        let read = side.read_frame(&self.stats);

        match self.config.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read).await.map_err(|_| {
                tracing::debug!("read timeout after {:?}", timeout);
                LinkError::Timeout
            })?,
            None => read.await,
        }
    }

    /// Encodes `frame` and writes it in full, then flushes.
    pub async fn write_frame(&self, frame: &Frame) -> Result<(), LinkError> {
        let encoded = frame.encode()?;

        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(LinkError::ConnectionClosed)?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;

        tracing::debug!(bytes = encoded.len(), %frame, "frame written");
        Ok(())
    }

    /// Discards bytes buffered by the framer.
    pub async fn reset(&self) -> Result<(), LinkError> {
        let mut side = self.reader.try_lock().map_err(|_| LinkError::ReaderBusy)?;
        side.framer.reset();
        Ok(())
    }

    /// Latest framer counters, updated as frames are resolved.
    pub fn stats(&self) -> FramerStats {
        *self.stats.borrow()
    }

    /// Shuts down the write half. Further writes fail with `ConnectionClosed`.
    pub async fn close(&self) -> Result<(), LinkError> {
        tracing::debug!("Closing link...");
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

impl<T> AsyncLink<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Starts the continuous read loop on the current tokio runtime.
    ///
    /// Every frame goes to `on_frame` and every framing error to `on_error`
    /// as `LinkError::Protocol`, in the order they were resolved. When
    /// `read_timeout` is set, each period without data is reported as
    /// `LinkError::Timeout` and the loop keeps reading. A transport error is
    /// passed to `on_error` once and ends the loop.
    pub fn start<F, E>(&self, on_frame: F, on_error: E) -> Result<ReadLoop, LinkError>
    where
        F: FnMut(Frame) + Send + 'static,
        E: FnMut(LinkError) + Send + 'static,
    {
        let side = self
            .reader
            .clone()
            .try_lock_owned()
            .map_err(|_| LinkError::ReaderBusy)?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let timeout = self.config.read_timeout;

        let handle = tokio::spawn(async move {
            let mut side = side;
            run_read_loop(&mut side, &stats, timeout, stop_rx, on_frame, on_error).await
        });

        Ok(ReadLoop {
            stop: stop_tx,
            handle,
        })
    }
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

async fn run_read_loop<T, F, E>(
    side: &mut ReadSide<T>,
    stats: &watch::Sender<FramerStats>,
    timeout: Option<Duration>,
    mut stop: watch::Receiver<bool>,
    mut on_frame: F,
    mut on_error: E,
) -> LoopExit
where
    T: AsyncRead,
    F: FnMut(Frame),
    E: FnMut(LinkError),
{
    tracing::debug!("read loop started");

    loop {
        // Dispatch everything already resolvable before reading again
        while !stop_requested(&stop) {
            let Some(result) = side.next_event(stats) else {
                break;
            };
            match result {
                Ok(frame) => on_frame(frame),
                Err(e) => on_error(LinkError::Protocol(e)),
            }
        }

        if stop_requested(&stop) {
            tracing::debug!("read loop stopped");
            return LoopExit::Stopped;
        }

        let filled = tokio::select! {
            biased;

            _ = stop.changed() => {
                tracing::debug!("read loop stopped while waiting for data");
                return LoopExit::Stopped;
            }

            result = side.fill_within(timeout) => result,
        };

        match filled {
            Ok(()) => {}
            Err(LinkError::Timeout) => on_error(LinkError::Timeout),
            Err(e) => {
                tracing::debug!("read loop terminated: {}", e);
                on_error(e);
                return LoopExit::Terminated;
            }
        }
    }
}
