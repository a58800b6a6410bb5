//! Binary frame format for the referee link.
//!
//! Frame layout (9 bytes of overhead + payload, multi-byte fields big-endian):
//!
//! ```text
//! +------+-------------+----------+------+------------+---------+-------+
//! | SOF  | data_length | sequence | crc8 | command_id | payload | crc16 |
//! | 0xA5 |   2 bytes   |  1 byte  |1 byte|  2 bytes   | N bytes |2 bytes|
//! +------+-------------+----------+------+------------+---------+-------+
//! ```
//!
//! `crc8` covers the four bytes before it; `crc16` covers every byte before it.

use crate::checksum::{crc16, crc16_chunks, crc8};
use crate::error::FrameError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Start-of-frame marker.
pub const SOF: u8 = 0xA5;

/// Size of the checksummed header: SOF, length, sequence, crc8.
pub const HEADER_SIZE: usize = 5;

/// Size of the command id that follows the header.
pub const COMMAND_ID_SIZE: usize = 2;

/// Size of the trailing crc16.
pub const TRAILER_SIZE: usize = 2;

/// Bytes on the wire in addition to the payload (5 + 2 + 2 = 9).
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + COMMAND_ID_SIZE + TRAILER_SIZE;

/// A validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared payload length.
    pub data_length: u16,
    /// Sender sequence number.
    pub sequence: u8,
    /// Header CRC-8 as carried on the wire.
    pub checksum: u8,
}

impl FrameHeader {
    /// Parses and validates the first `HEADER_SIZE` bytes of `bytes`.
    ///
    /// Checks run in wire order: marker, header checksum, then the declared
    /// length against `max_payload`. The length is never trusted before the
    /// checksum has matched.
    pub fn parse(bytes: &[u8], max_payload: u16) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::IncompleteFrame {
                needed: HEADER_SIZE - bytes.len(),
            });
        }

        if bytes[0] != SOF {
            return Err(FrameError::InvalidMarker(bytes[0]));
        }

        let expected = bytes[4];
        let actual = crc8(&bytes[..4]);
        if expected != actual {
            return Err(FrameError::HeaderChecksumMismatch { expected, actual });
        }

        let data_length = u16::from_be_bytes([bytes[1], bytes[2]]);
        if data_length > max_payload {
            return Err(FrameError::LengthOutOfRange {
                length: data_length,
                max: max_payload,
            });
        }

        Ok(Self {
            data_length,
            sequence: bytes[3],
            checksum: expected,
        })
    }

    /// Total encoded size of the frame this header announces.
    pub fn frame_len(&self) -> usize {
        FRAME_OVERHEAD + self.data_length as usize
    }
}

/// A single referee frame.
///
/// The marker, length and both checksums are derived from the fields, so a
/// frame never carries a stale checksum. Decoded frames are immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    sequence: u8,
    command_id: u16,
    payload: Bytes,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(sequence: u8, command_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            command_id,
            payload: payload.into(),
        }
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn command_id(&self) -> u16 {
        self.command_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Value of the length field on the wire.
    ///
    /// Saturates at `u16::MAX` for payloads that `encode` would reject.
    pub fn data_length(&self) -> u16 {
        u16::try_from(self.payload.len()).unwrap_or(u16::MAX)
    }

    /// Number of bytes `encode` produces.
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    fn header_prefix(&self) -> [u8; 4] {
        let [hi, lo] = self.data_length().to_be_bytes();
        [SOF, hi, lo, self.sequence]
    }

    /// Header CRC-8 this frame carries on the wire.
    pub fn header_checksum(&self) -> u8 {
        crc8(&self.header_prefix())
    }

    /// Frame CRC-16 this frame carries on the wire.
    pub fn frame_checksum(&self) -> u16 {
        let prefix = self.header_prefix();
        let header_crc = [crc8(&prefix)];
        let command_id = self.command_id.to_be_bytes();
        crc16_chunks(&[&prefix[..], &header_crc[..], &command_id[..], &self.payload[..]])
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, FrameError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), FrameError> {
        let data_length =
            u16::try_from(self.payload.len()).map_err(|_| FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: u16::MAX as usize,
            })?;

        let start = buf.len();
        buf.reserve(self.encoded_len());

        // SOF (1 byte)
        buf.put_u8(SOF);

        // Data length (2 bytes)
        buf.put_u16(data_length);

        // Sequence (1 byte)
        buf.put_u8(self.sequence);

        // CRC-8 of the four bytes above (1 byte)
        let header_crc = crc8(&buf[start..]);
        buf.put_u8(header_crc);

        // Command id (2 bytes)
        buf.put_u16(self.command_id);

        // Payload
        buf.put_slice(&self.payload);

        // CRC-16 of everything above (2 bytes)
        let frame_crc = crc16(&buf[start..]);
        buf.put_u16(frame_crc);

        Ok(())
    }

    /// Decodes a frame from exactly one encoded span.
    ///
    /// Both checksums are verified; a mismatch is an error, never a frame.
    pub fn decode(bytes: &[u8], max_payload: u16) -> Result<Self, FrameError> {
        let header = FrameHeader::parse(bytes, max_payload)?;
        let frame_len = header.frame_len();

        if bytes.len() < frame_len {
            return Err(FrameError::IncompleteFrame {
                needed: frame_len - bytes.len(),
            });
        }
        if bytes.len() > frame_len {
            return Err(FrameError::FrameLengthMismatch {
                expected: frame_len,
                actual: bytes.len(),
            });
        }

        let (body, trailer) = bytes.split_at(frame_len - TRAILER_SIZE);
        let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
        let actual = crc16(body);
        if expected != actual {
            return Err(FrameError::FrameChecksumMismatch { expected, actual });
        }

        let command_id = u16::from_be_bytes([bytes[HEADER_SIZE], bytes[HEADER_SIZE + 1]]);
        let payload = Bytes::copy_from_slice(&body[HEADER_SIZE + COMMAND_ID_SIZE..]);

        Ok(Self {
            sequence: header.sequence,
            command_id,
            payload,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cmd={:#06x} seq={} len={}",
            self.command_id,
            self.sequence,
            self.payload.len()
        )
    }
}
