//! rmserial - referee serial link monitor
//!
//! Opens a serial device, decodes every frame arriving on it and logs it.

mod config;

use config::Config;
use rmserial_link::{AsyncLink, LinkError};
use rmserial_protocol::{Frame, FramerStats};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run());

    // Device reads run on the blocking pool and may stay parked until the
    // next byte arrives.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (from file if RMSERIAL_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("RMSERIAL_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    let link_config = config.link.to_link_config();

    tracing::info!("Starting rmserial monitor");
    tracing::info!("  Device: {}", config.device.path.display());
    tracing::info!("  Read buffer: {} bytes", link_config.read_buffer_size);
    tracing::info!("  Max payload: {} bytes", link_config.max_payload);
    match link_config.read_timeout {
        Some(timeout) => tracing::info!("  Idle warning after: {:?}", timeout),
        None => tracing::info!("  Idle warning: disabled"),
    }
    match config.monitor.stats_interval() {
        Some(interval) => tracing::info!("  Stats interval: {:?}", interval),
        None => tracing::info!("  Stats interval: disabled"),
    }

    let device = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&config.device.path)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to open device {}: {}",
                config.device.path.display(),
                e
            );
            e
        })?;

    let link = AsyncLink::with_config(device, link_config);

    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel();
    let hex_dump = config.monitor.hex_dump;
    let read_timeout = link.config().read_timeout.unwrap_or_default();
    let read_loop = link.start(
        move |frame| log_frame(&frame, hex_dump),
        move |err| match err {
            LinkError::Protocol(e) => tracing::warn!(error = %e, "corrupted frame dropped"),
            LinkError::Timeout => tracing::warn!("no data from device within {:?}", read_timeout),
            e => {
                let _ = failed_tx.send(e);
            }
        },
    )?;

    let stats_interval = config.monitor.stats_interval();
    let mut ticker = tokio::time::interval(stats_interval.unwrap_or(Duration::from_secs(60)));
    ticker.tick().await;

    let mut failure = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, stopping monitor...");
                break;
            }
            Some(err) = failed_rx.recv() => {
                tracing::error!("Link failed: {}", err);
                failure = Some(err);
                break;
            }
            _ = ticker.tick(), if stats_interval.is_some() => {
                log_stats(&link.stats());
            }
        }
    }

    let exit = read_loop.stop().await;
    tracing::debug!("read loop exited: {:?}", exit);
    log_stats(&link.stats());

    if let Err(e) = link.close().await {
        tracing::warn!("Failed to close device: {}", e);
    }

    tracing::info!("Monitor stopped");
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn log_frame(frame: &Frame, hex_dump: bool) {
    if hex_dump {
        tracing::info!(payload = %hex::encode(frame.payload()), "{}", frame);
    } else {
        tracing::info!("{}", frame);
    }
}

fn log_stats(stats: &FramerStats) {
    tracing::info!(
        frames = stats.frames_decoded,
        corrupted = stats.corrupted_frames(),
        header_crc = stats.header_checksum_errors,
        frame_crc = stats.frame_checksum_errors,
        length = stats.length_errors,
        discarded_bytes = stats.bytes_discarded,
        "link stats"
    );
}
