//! Header and frame checksums.
//!
//! Both checksums are table-driven reflected CRCs. The lookup tables are built
//! at compile time by the `crc` crate and live in process-wide statics, so they
//! need neither initialization order nor synchronization.

use crc::{Algorithm, Crc, CRC_16_MCRF4XX};

/// CRC-8 protecting the frame header: polynomial 0x31 (reflected 0x8C),
/// initial value 0xFF, no final xor.
pub const HEADER_CRC_ALGORITHM: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x31,
    init: 0xff,
    refin: true,
    refout: true,
    xorout: 0x00,
    check: 0x0b,
    residue: 0x00,
};

/// CRC-16 protecting the whole frame: CRC-16/MCRF4XX (polynomial 0x1021
/// reflected, initial value 0xFFFF, no final xor).
pub const FRAME_CRC_ALGORITHM: Algorithm<u16> = CRC_16_MCRF4XX;

static HEADER_CRC: Crc<u8> = Crc::<u8>::new(&HEADER_CRC_ALGORITHM);
static FRAME_CRC: Crc<u16> = Crc::<u16>::new(&FRAME_CRC_ALGORITHM);

/// Computes the header CRC-8 over `bytes`.
pub fn crc8(bytes: &[u8]) -> u8 {
    HEADER_CRC.checksum(bytes)
}

/// Computes the frame CRC-16 over `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    FRAME_CRC.checksum(bytes)
}

/// Computes the frame CRC-16 over the concatenation of `chunks`.
pub(crate) fn crc16_chunks(chunks: &[&[u8]]) -> u16 {
    let mut digest = FRAME_CRC.digest();
    for chunk in chunks {
        digest.update(chunk);
    }
    digest.finalize()
}

/// Returns true if the last byte of `bytes` is the CRC-8 of the bytes before it.
pub fn verify_crc8(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        Some((&expected, data)) => crc8(data) == expected,
        None => false,
    }
}

/// Returns true if the last two bytes of `bytes` hold the big-endian CRC-16 of
/// the bytes before them.
pub fn verify_crc16(bytes: &[u8]) -> bool {
    if bytes.len() < 2 {
        return false;
    }
    let (data, trailer) = bytes.split_at(bytes.len() - 2);
    crc16(data) == u16::from_be_bytes([trailer[0], trailer[1]])
}
