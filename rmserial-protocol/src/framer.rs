//! Incremental stream framer.
//!
//! The framer accepts bytes in arbitrary chunks and yields frames or
//! classified framing errors. After any corruption it drops only the marker
//! byte that started the rejected candidate and rescans what is already
//! buffered, so a valid frame that follows noise or a damaged frame is never
//! lost.

use crate::error::FrameError;
use crate::frame::{Frame, FrameHeader, HEADER_SIZE, SOF};
use crate::DEFAULT_MAX_PAYLOAD;
use bytes::{Buf, BytesMut};

/// Initial capacity of the accumulation buffer.
const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Framer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerConfig {
    /// Largest declared payload length accepted from the stream.
    pub max_payload: u16,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl FramerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_payload(mut self, max_payload: u16) -> Self {
        self.max_payload = max_payload;
        self
    }
}

/// Parse phase of the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Scanning for the start marker.
    SeekingMarker,
    /// Marker found at the front of the buffer, waiting for the full header.
    ReadingHeader,
    /// Header validated, waiting for the rest of the frame.
    ReadingBody { frame_len: usize },
    /// Whole frame buffered, checking the frame checksum.
    Verifying { frame_len: usize },
}

/// Counters describing what the framer has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub frames_decoded: u64,
    pub header_checksum_errors: u64,
    pub frame_checksum_errors: u64,
    pub length_errors: u64,
    /// Bytes thrown away while looking for a marker.
    pub bytes_discarded: u64,
}

impl FramerStats {
    /// Total number of rejected frame candidates.
    pub fn corrupted_frames(&self) -> u64 {
        self.header_checksum_errors + self.frame_checksum_errors + self.length_errors
    }
}

/// Stateful decoder turning a byte stream into frames.
#[derive(Debug)]
pub struct Framer {
    buffer: BytesMut,
    state: FramerState,
    config: FramerConfig,
    stats: FramerStats,
}

impl Framer {
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: FramerState::SeekingMarker,
            config,
            stats: FramerStats::default(),
        }
    }

    /// Appends `data` and returns an iterator over everything now resolvable.
    ///
    /// The iterator is lazy: results that are not pulled stay buffered and
    /// are produced by the next call to `feed` or `next_frame`.
    pub fn feed(&mut self, data: &[u8]) -> Frames<'_> {
        self.extend(data);
        Frames { framer: self }
    }

    /// Appends data to the internal buffer without decoding.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Resolves the next frame or framing error from the buffer.
    ///
    /// Returns `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        loop {
            match self.state {
                FramerState::SeekingMarker => {
                    match self.buffer.iter().position(|&b| b == SOF) {
                        Some(pos) => {
                            self.discard(pos);
                            self.state = FramerState::ReadingHeader;
                        }
                        None => {
                            let len = self.buffer.len();
                            self.discard(len);
                            return None;
                        }
                    }
                }
                FramerState::ReadingHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return None;
                    }
                    match FrameHeader::parse(&self.buffer[..HEADER_SIZE], self.config.max_payload)
                    {
                        Ok(header) => {
                            tracing::trace!(
                                data_length = header.data_length,
                                sequence = header.sequence,
                                "frame header accepted"
                            );
                            self.state = FramerState::ReadingBody {
                                frame_len: header.frame_len(),
                            };
                        }
                        Err(e) => return Some(Err(self.reject(e))),
                    }
                }
                FramerState::ReadingBody { frame_len } => {
                    if self.buffer.len() < frame_len {
                        return None;
                    }
                    self.state = FramerState::Verifying { frame_len };
                }
                FramerState::Verifying { frame_len } => {
                    return match Frame::decode(&self.buffer[..frame_len], self.config.max_payload)
                    {
                        Ok(frame) => {
                            self.buffer.advance(frame_len);
                            self.state = FramerState::SeekingMarker;
                            self.stats.frames_decoded += 1;
                            Some(Ok(frame))
                        }
                        Err(e) => Some(Err(self.reject(e))),
                    };
                }
            }
        }
    }

    /// Records a rejected candidate and resynchronizes past its marker byte.
    fn reject(&mut self, err: FrameError) -> FrameError {
        match err {
            FrameError::HeaderChecksumMismatch { .. } => self.stats.header_checksum_errors += 1,
            FrameError::FrameChecksumMismatch { .. } => self.stats.frame_checksum_errors += 1,
            FrameError::LengthOutOfRange { .. } => self.stats.length_errors += 1,
            _ => {}
        }
        tracing::trace!(error = %err, "dropping frame candidate");

        self.buffer.advance(1);
        self.state = FramerState::SeekingMarker;
        err
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        tracing::trace!(bytes = n, "discarding bytes before start marker");
        self.buffer.advance(n);
        self.stats.bytes_discarded += n as u64;
    }

    /// Drops all buffered bytes and returns to marker search.
    ///
    /// Counters are kept; use this when the underlying stream is reopened.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = FramerState::SeekingMarker;
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    pub fn config(&self) -> FramerConfig {
        self.config
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sequence of decode results borrowed from a [`Framer`].
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc8;
    use proptest::prelude::*;

    fn encode(frame: &Frame) -> Vec<u8> {
        frame.encode().unwrap().to_vec()
    }

    /// Builds a header with a valid CRC-8 announcing `data_length` bytes.
    fn crafted_header(data_length: u16, sequence: u8) -> Vec<u8> {
        let [hi, lo] = data_length.to_be_bytes();
        let mut header = vec![SOF, hi, lo, sequence];
        header.push(crc8(&header));
        header
    }

    #[test]
    fn test_single_frame() {
        let frame = Frame::new(1, 0x0001, &b"hello"[..]);
        let mut framer = Framer::new();

        let results: Vec<_> = framer.feed(&encode(&frame)).collect();
        assert_eq!(results, vec![Ok(frame)]);
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.state(), FramerState::SeekingMarker);
        assert_eq!(framer.stats().frames_decoded, 1);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let frame = Frame::new(3, 0x0102, vec![7u8; 40]);
        let bytes = encode(&frame);
        let mut framer = Framer::new();

        assert_eq!(framer.feed(&bytes[..3]).count(), 0);
        assert_eq!(framer.state(), FramerState::ReadingHeader);

        assert_eq!(framer.feed(&bytes[3..20]).count(), 0);
        assert_eq!(
            framer.state(),
            FramerState::ReadingBody {
                frame_len: bytes.len()
            }
        );
        assert_eq!(framer.buffered(), 20);

        let results: Vec<_> = framer.feed(&bytes[20..]).collect();
        assert_eq!(results, vec![Ok(frame)]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let frame = Frame::new(9, 0x0301, vec![0xa5; 16]);
        let mut framer = Framer::new();
        let mut decoded = Vec::new();

        for byte in encode(&frame) {
            decoded.extend(framer.feed(&[byte]));
        }
        assert_eq!(decoded, vec![Ok(frame)]);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let first = Frame::new(1, 0x0001, &b"one"[..]);
        let second = Frame::new(2, 0x0002, &b"two!"[..]);

        let mut bytes = encode(&first);
        bytes.extend(encode(&second));

        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes).collect();
        assert_eq!(results, vec![Ok(first), Ok(second)]);
    }

    #[test]
    fn test_lazy_iteration_keeps_unpulled_frames() {
        let first = Frame::new(1, 0x0001, &b"a"[..]);
        let second = Frame::new(2, 0x0002, &b"b"[..]);

        let mut bytes = encode(&first);
        bytes.extend(encode(&second));

        let mut framer = Framer::new();
        let pulled = framer.feed(&bytes).next();
        assert_eq!(pulled, Some(Ok(first)));
        assert_eq!(framer.buffered(), second.encoded_len());

        // A later feed picks up where the iterator stopped.
        let rest: Vec<_> = framer.feed(&[]).collect();
        assert_eq!(rest, vec![Ok(second)]);
    }

    #[test]
    fn test_garbage_without_marker_is_discarded() {
        let mut framer = Framer::new();
        assert_eq!(framer.feed(&[0x00, 0x11, 0x22, 0x33]).count(), 0);
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.stats().bytes_discarded, 4);
    }

    #[test]
    fn test_stray_bytes_before_marker() {
        let frame = Frame::new(4, 0x0201, &b"data"[..]);
        let mut bytes = vec![0x01, 0x02, 0x03];
        bytes.extend(encode(&frame));

        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes).collect();
        assert_eq!(results, vec![Ok(frame)]);
        assert_eq!(framer.stats().bytes_discarded, 3);
    }

    #[test]
    fn test_header_checksum_mismatch_reported_before_body() {
        let frame = Frame::new(1, 0x0003, vec![0u8; 100]);
        let mut bytes = encode(&frame);
        bytes[3] ^= 0x04;

        // Only the header is fed; the error must not wait for the body.
        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes[..HEADER_SIZE]).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(FrameError::HeaderChecksumMismatch { .. })
        ));
        assert_eq!(framer.stats().header_checksum_errors, 1);
    }

    #[test]
    fn test_every_header_bit_flip_detected() {
        let frame = Frame::new(1, 0x0003, vec![0u8; 8]);
        let bytes = encode(&frame);

        for byte in 1..HEADER_SIZE {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[byte] ^= 1 << bit;

                let mut framer = Framer::with_config(FramerConfig::new().with_max_payload(u16::MAX));
                let first = framer.feed(&corrupted).next();
                assert!(
                    matches!(first, Some(Err(FrameError::HeaderChecksumMismatch { .. }))),
                    "byte {} bit {}: {:?}",
                    byte,
                    bit,
                    first
                );
            }
        }
    }

    #[test]
    fn test_marker_bit_flip_drops_frame_silently() {
        // No byte after the marker is 0xA5, so nothing restarts a candidate.
        let frame = Frame::new(1, 0x0003, vec![0u8; 8]);
        let bytes = encode(&frame);
        assert!(!bytes[1..].contains(&SOF));

        for bit in 0..8 {
            let mut corrupted = bytes.clone();
            corrupted[0] ^= 1 << bit;

            let mut framer = Framer::new();
            assert_eq!(framer.feed(&corrupted).count(), 0, "bit {}", bit);
            assert_eq!(framer.buffered(), 0);
            assert_eq!(framer.stats().bytes_discarded, bytes.len() as u64);
            assert_eq!(framer.stats().corrupted_frames(), 0);
            assert_eq!(framer.stats().frames_decoded, 0);
        }
    }

    #[test]
    fn test_recovers_after_corrupted_header() {
        let good = Frame::new(2, 0x0002, &b"intact"[..]);
        let mut corrupted = encode(&Frame::new(1, 0x0001, &b"broken"[..]));
        corrupted[4] ^= 0xff;

        let mut bytes = corrupted;
        bytes.extend(encode(&good));

        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(FrameError::HeaderChecksumMismatch { .. })
        ));
        assert_eq!(results[1], Ok(good));
    }

    #[test]
    fn test_recovers_after_corrupted_payload() {
        let good = Frame::new(2, 0x0002, &b"intact"[..]);
        let mut corrupted = encode(&Frame::new(1, 0x0001, &b"broken"[..]));
        corrupted[8] ^= 0x01;

        let mut bytes = corrupted;
        bytes.extend(encode(&good));

        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(FrameError::FrameChecksumMismatch { .. })
        ));
        assert_eq!(results[1], Ok(good));
        assert_eq!(framer.stats().frame_checksum_errors, 1);
    }

    #[test]
    fn test_marker_inside_rejected_frame_is_rescanned() {
        // The corrupted frame's payload carries a complete valid frame.
        let inner = Frame::new(7, 0x0007, &b"inner"[..]);
        let outer = Frame::new(1, 0x0001, encode(&inner));
        let mut bytes = encode(&outer);
        let len = bytes.len();
        bytes[len - 1] ^= 0x55;

        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes).collect();
        assert!(matches!(
            results[0],
            Err(FrameError::FrameChecksumMismatch { .. })
        ));
        assert!(results.contains(&Ok(inner)));
    }

    #[test]
    fn test_length_out_of_range_then_recovery() {
        let good = Frame::new(5, 0x0005, &b"after"[..]);
        let mut bytes = crafted_header(2000, 1);
        bytes.extend(encode(&good));

        let mut framer = Framer::new();
        let results: Vec<_> = framer.feed(&bytes).collect();
        assert_eq!(
            results,
            vec![
                Err(FrameError::LengthOutOfRange {
                    length: 2000,
                    max: DEFAULT_MAX_PAYLOAD
                }),
                Ok(good)
            ]
        );
        assert_eq!(framer.stats().length_errors, 1);
    }

    #[test]
    fn test_configured_max_payload() {
        let frame = Frame::new(1, 1, vec![0u8; 32]);
        let mut framer = Framer::with_config(FramerConfig::new().with_max_payload(16));

        let first = framer.feed(&encode(&frame)).next();
        assert_eq!(
            first,
            Some(Err(FrameError::LengthOutOfRange { length: 32, max: 16 }))
        );
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let frame = Frame::new(1, 1, &b"abc"[..]);
        let bytes = encode(&frame);

        let mut framer = Framer::new();
        assert_eq!(framer.feed(&bytes[..6]).count(), 0);
        framer.reset();
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.state(), FramerState::SeekingMarker);

        let results: Vec<_> = framer.feed(&bytes).collect();
        assert_eq!(results, vec![Ok(frame)]);
    }

    #[test]
    fn test_stats_corrupted_frames() {
        let stats = FramerStats {
            header_checksum_errors: 2,
            frame_checksum_errors: 3,
            length_errors: 1,
            ..Default::default()
        };
        assert_eq!(stats.corrupted_frames(), 6);
    }

    #[test]
    fn test_config_full_length_range() {
        assert_eq!(FramerConfig::default().max_payload, DEFAULT_MAX_PAYLOAD);

        // The 16-bit length field is the only ceiling: a maximal frame is accepted.
        let frame = Frame::new(1, 0x0001, vec![0x42; u16::MAX as usize]);
        let mut framer = Framer::with_config(FramerConfig::new().with_max_payload(u16::MAX));
        let results: Vec<_> = framer.feed(&encode(&frame)).collect();
        assert_eq!(results, vec![Ok(frame)]);

        let config = FramerConfig::new().with_max_payload(0);
        assert_eq!(config.max_payload, 0);
    }

    fn arb_frame() -> impl Strategy<Value = Frame> {
        (
            any::<u8>(),
            any::<u16>(),
            prop::collection::vec(any::<u8>(), 0..256),
        )
            .prop_map(|(seq, cmd, payload)| Frame::new(seq, cmd, payload))
    }

    proptest! {
        #[test]
        fn prop_roundtrip(frame in arb_frame()) {
            let encoded = frame.encode().unwrap();
            prop_assert_eq!(encoded.len(), 9 + frame.payload().len());
            prop_assert_eq!(Frame::decode(&encoded, DEFAULT_MAX_PAYLOAD).unwrap(), frame);
        }

        #[test]
        fn prop_resync_after_garbage(
            frame in arb_frame(),
            garbage in prop::collection::vec(any::<u8>().prop_filter("no marker", |b| *b != SOF), 0..64),
        ) {
            let mut bytes = garbage.clone();
            bytes.extend(encode(&frame));

            let mut framer = Framer::new();
            let results: Vec<_> = framer.feed(&bytes).collect();
            prop_assert_eq!(results, vec![Ok(frame)]);
            prop_assert_eq!(framer.stats().bytes_discarded, garbage.len() as u64);
        }

        #[test]
        fn prop_resync_after_garbage_with_false_markers(
            frame in (any::<u8>(), any::<u16>(), prop::collection::vec(any::<u8>(), 0..=16))
                .prop_map(|(seq, cmd, payload)| Frame::new(seq, cmd, payload)),
            garbage in prop::collection::vec(
                prop_oneof![Just(SOF), any::<u8>()],
                0..64,
            ),
        ) {
            // Trailing zeros let any false header that reaches past the frame
            // collect its body and fail verification.
            let mut bytes = garbage;
            bytes.extend(encode(&frame));
            bytes.extend([0u8; 32]);

            let mut framer = Framer::with_config(FramerConfig::new().with_max_payload(16));
            let results: Vec<_> = framer.feed(&bytes).collect();
            prop_assert!(results.contains(&Ok(frame)), "results: {:?}", results);
        }

        #[test]
        fn prop_fragmentation_invariance(
            frame in arb_frame(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let bytes = encode(&frame);
            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();
            points.dedup();

            let mut framer = Framer::new();
            let mut results = Vec::new();
            for window in points.windows(2) {
                results.extend(framer.feed(&bytes[window[0]..window[1]]));
            }
            prop_assert_eq!(results, vec![Ok(frame)]);
            prop_assert_eq!(framer.buffered(), 0);
        }

        #[test]
        fn prop_two_frames_in_order(first in arb_frame(), second in arb_frame()) {
            let mut bytes = encode(&first);
            bytes.extend(encode(&second));

            let mut framer = Framer::new();
            let results: Vec<_> = framer.feed(&bytes).collect();
            prop_assert_eq!(results, vec![Ok(first), Ok(second)]);
        }
    }
}
