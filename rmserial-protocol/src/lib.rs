//! # rmserial-protocol
//!
//! Wire protocol implementation for the referee serial link.
//!
//! This crate provides:
//! - Table-driven CRC-8 (header) and CRC-16 (whole frame) checksums
//! - The binary frame layout with big-endian multi-byte fields
//! - An incremental stream framer that resynchronizes after corruption
//! - Classified framing errors

pub mod checksum;
pub mod error;
pub mod frame;
pub mod framer;

pub use checksum::{crc16, crc8, verify_crc16, verify_crc8};
pub use error::FrameError;
pub use frame::{Frame, FrameHeader, FRAME_OVERHEAD, HEADER_SIZE, SOF};
pub use framer::{Framer, FramerConfig, FramerState, FramerStats, Frames};

/// Default ceiling for the declared payload length of an incoming frame.
pub const DEFAULT_MAX_PAYLOAD: u16 = 1024;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LIMIT: u16 = u16::MAX;
