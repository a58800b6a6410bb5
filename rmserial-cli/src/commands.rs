//! Command execution.

use crate::Commands;
use colored::Colorize;
use rmserial_link::SerialLink;
use rmserial_protocol::{Frame, Framer, FramerConfig};
use std::io::Read;
use std::path::Path;

/// Executes a one-shot command and returns the formatted output.
pub fn execute(cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Encode { seq, cmd, payload } => {
            let payload = parse_payload_arg(payload.as_deref())?;
            let frame = Frame::new(seq, cmd, payload);
            Ok(hex::encode(frame.encode()?))
        }

        Commands::Decode {
            hex,
            json,
            max_payload,
        } => {
            let input = if hex.is_empty() {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                hex.join("")
            };
            let bytes = parse_hex(&input)?;
            Ok(decode(&bytes, max_payload, json))
        }

        Commands::Send {
            device,
            seq,
            cmd,
            payload,
        } => {
            let payload = parse_payload_arg(payload.as_deref())?;
            let frame = Frame::new(seq, cmd, payload);
            send(&device, &frame)?;
            Ok(format!(
                "{} {} to {}",
                "Sent".green(),
                frame,
                device.display().to_string().cyan()
            ))
        }

        // Watch streams output and is handled directly in main.rs
        Commands::Watch { .. } => unreachable!(),
    }
}

/// Runs `bytes` through a fresh framer and describes every frame and error.
pub fn decode(bytes: &[u8], max_payload: u16, json: bool) -> String {
    let mut framer = Framer::with_config(FramerConfig::new().with_max_payload(max_payload));
    let mut lines = Vec::new();

    for result in framer.feed(bytes) {
        match result {
            Ok(frame) => lines.push(format_frame(&frame, json)),
            Err(e) if json => {
                lines.push(serde_json::json!({ "error": e.to_string() }).to_string())
            }
            Err(e) => lines.push(format!("{}: {}", "Dropped".yellow(), e)),
        }
    }

    if !json {
        let stats = framer.stats();
        lines.push(
            format!(
                "{} frames, {} corrupted, {} bytes discarded, {} bytes incomplete",
                stats.frames_decoded,
                stats.corrupted_frames(),
                stats.bytes_discarded,
                framer.buffered()
            )
            .dimmed()
            .to_string(),
        );
    }

    lines.join("\n")
}

/// Encodes and writes one frame to the device.
fn send(device: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::OpenOptions::new().write(true).open(device)?;
    let mut link = SerialLink::new(file);
    link.write_frame(frame)?;
    Ok(())
}

/// Formats a frame for display, either as colored text or a JSON line.
pub fn format_frame(frame: &Frame, json: bool) -> String {
    if json {
        return serde_json::json!({
            "sequence": frame.sequence(),
            "command_id": frame.command_id(),
            "data_length": frame.data_length(),
            "payload": hex::encode(frame.payload()),
        })
        .to_string();
    }

    format!(
        "{} {} {} {}",
        format!("seq={}", frame.sequence()).dimmed(),
        format!("cmd=0x{:04x}", frame.command_id()).cyan(),
        format!("len={}", frame.data_length()).bold(),
        hex::encode(frame.payload())
    )
}

/// Parses a `u16` given in decimal or with a `0x` prefix.
pub fn parse_u16(arg: &str) -> Result<u16, String> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => arg.parse(),
    };
    parsed.map_err(|e| format!("invalid value '{}': {}", arg, e))
}

/// Parses hex text, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);
    hex::decode(digits)
}

/// Parses a payload argument (hex, or @file to read raw bytes).
fn parse_payload_arg(arg: Option<&str>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match arg {
        None => Ok(Vec::new()),
        Some(arg) => match arg.strip_prefix('@') {
            Some(path) => Ok(std::fs::read(path)?),
            None => Ok(parse_hex(arg)?),
        },
    }
}
