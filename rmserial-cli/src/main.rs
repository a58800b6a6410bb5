//! rmserial-cli - Command-line tools for the rmserial frame protocol
//!
//! Encodes and decodes frames offline and talks to a serial device directly.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rmserial_link::{LinkConfig, LinkError, SerialLink};
use rmserial_protocol::DEFAULT_MAX_PAYLOAD;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rmserial-cli")]
#[command(about = "Command-line tools for the rmserial referee frame protocol")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a frame and print it as hex
    Encode {
        /// Sequence number
        #[arg(short, long, default_value = "0")]
        seq: u8,

        /// Command id (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = commands::parse_u16)]
        cmd: u16,

        /// Payload as hex (or @file to read raw bytes)
        payload: Option<String>,
    },

    /// Decode hex bytes (stdin when no argument is given)
    Decode {
        /// Hex input; whitespace is ignored
        hex: Vec<String>,

        /// Print frames as JSON lines
        #[arg(long)]
        json: bool,

        /// Largest accepted payload length
        #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
        max_payload: u16,
    },

    /// Write one frame to a device
    Send {
        /// Serial device path
        #[arg(short, long, env = "RMSERIAL_DEVICE")]
        device: PathBuf,

        /// Sequence number
        #[arg(short, long, default_value = "0")]
        seq: u8,

        /// Command id (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = commands::parse_u16)]
        cmd: u16,

        /// Payload as hex (or @file to read raw bytes)
        payload: Option<String>,
    },

    /// Print frames read from a device
    Watch {
        /// Serial device path
        #[arg(short, long, env = "RMSERIAL_DEVICE")]
        device: PathBuf,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Print frames as JSON lines
        #[arg(long)]
        json: bool,

        /// Largest accepted payload length
        #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
        max_payload: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            device,
            count,
            json,
            max_payload,
        } => {
            // Watch streams frames until the count is reached or the device closes
            let file = std::fs::File::open(&device).map_err(|e| {
                eprintln!("{} {}: {}", "Failed to open".red(), device.display(), e);
                e
            })?;
            let config = LinkConfig::new().with_max_payload(max_payload);
            let mut link = SerialLink::with_config(file, config);

            eprintln!("{} {}", "Watching".green(), device.display().to_string().cyan());
            eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

            let mut seen = 0;
            while count.map_or(true, |limit| seen < limit) {
                match link.read_event() {
                    Ok(frame) => {
                        println!("{}", commands::format_frame(&frame, json));
                        seen += 1;
                    }
                    Err(LinkError::Protocol(e)) => {
                        eprintln!("{}: {}", "Dropped".yellow(), e);
                    }
                    Err(LinkError::ConnectionClosed) => {
                        eprintln!("{}", "Device closed".red());
                        break;
                    }
                    Err(e) => {
                        eprintln!("{}: {}", "Error".red(), e);
                        std::process::exit(1);
                    }
                }
            }

            let stats = link.stats();
            eprintln!(
                "{} frames, {} corrupted, {} bytes discarded",
                stats.frames_decoded,
                stats.corrupted_frames(),
                stats.bytes_discarded
            );
        }
        cmd => match commands::execute(cmd) {
            Ok(output) => {
                println!("{}", output);
            }
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
