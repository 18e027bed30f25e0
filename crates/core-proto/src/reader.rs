//! Streaming frame reassembly.
//!
//! `FrameReader` accepts arbitrary byte chunks and yields complete frames.
//! Partial frames (including half-headers) stay buffered across calls. An
//! oversize length is reported once as a protocol error; its header has
//! been fully consumed at that point, so the reader discards the payload
//! bytes as they arrive and resynchronizes at the next header boundary.

use crate::frame::{Frame, FrameHeader, HEADER_LEN};
use crate::ProtoError;
use tracing::warn;

/// Default payload cap, 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    /// Read position within `buf`; consumed bytes are compacted lazily.
    pos: usize,
    max_payload: u32,
    /// Payload bytes still to discard after an oversize header.
    skip_remaining: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: u32) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            max_payload,
            skip_remaining: 0,
        }
    }

    /// Append a chunk. Chunk boundaries carry no meaning; frames may span
    /// any number of appends.
    pub fn append(&mut self, bytes: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn compact(&mut self) {
        // Reclaim consumed prefix once it dominates the buffer.
        if self.pos > 0 && (self.pos >= self.buf.len() || self.pos > 4096) {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    fn drain_skip(&mut self) {
        if self.skip_remaining == 0 {
            return;
        }
        let available = self.buf.len() - self.pos;
        let take = available.min(self.skip_remaining);
        self.pos += take;
        self.skip_remaining -= take;
    }

    /// Next complete frame, or `Ok(None)` when more bytes are needed. The
    /// error case is an oversize frame, reported once; subsequent calls
    /// silently continue discarding its payload.
    pub fn read(&mut self) -> Result<Option<Frame>, ProtoError> {
        self.drain_skip();
        if self.skip_remaining > 0 {
            return Ok(None);
        }
        let available = self.buf.len() - self.pos;
        if available < HEADER_LEN {
            return Ok(None);
        }
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(&self.buf[self.pos..self.pos + HEADER_LEN]);
        let header = FrameHeader::decode(&header_bytes);

        if header.length > self.max_payload {
            // Header fields fully consumed: skip the payload and resume at
            // the next boundary.
            self.pos += HEADER_LEN;
            self.skip_remaining = header.length as usize;
            self.drain_skip();
            warn!(
                target: "proto.reader",
                length = header.length,
                max = self.max_payload,
                "discarding oversize frame"
            );
            return Err(ProtoError::OversizeFrame {
                length: header.length,
                max: self.max_payload,
            });
        }

        let frame_len = HEADER_LEN + header.length as usize;
        if available < frame_len {
            return Ok(None);
        }
        let start = self.pos + HEADER_LEN;
        let payload = self.buf[start..start + header.length as usize].to_vec();
        self.pos += frame_len;
        self.compact();
        Ok(Some(Frame { header, payload }))
    }

    /// Drain every complete frame currently buffered. Oversize frames have
    /// already been reported by `read`; here they are skipped so a stream
    /// with one bad frame still yields the rest.
    pub fn read_all(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        loop {
            match self.read() {
                Ok(Some(frame)) => out.push(frame),
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFlags, MessageType, encode_frame};

    fn frame(payload: &[u8], seq: u16) -> Vec<u8> {
        encode_frame(MessageType::SetData, payload, FrameFlags::empty(), seq)
    }

    #[test]
    fn whole_frame_in_one_append() {
        let mut r = FrameReader::new();
        r.append(&frame(b"hello", 7));
        let f = r.read().unwrap().expect("frame");
        assert_eq!(f.payload, b"hello");
        assert_eq!(f.header.seq, 7);
        assert!(r.read().unwrap().is_none());
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn byte_by_byte_reassembly() {
        let mut r = FrameReader::new();
        let a = frame(b"first", 1);
        let b = frame(b"", 2);
        let mut all = a.clone();
        all.extend_from_slice(&b);
        let mut seen = Vec::new();
        for &byte in &all {
            r.append(&[byte]);
            seen.extend(r.read_all());
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].payload, b"first");
        assert_eq!(seen[0].header.seq, 1);
        assert!(seen[1].payload.is_empty());
        assert_eq!(seen[1].header.seq, 2);
    }

    #[test]
    fn half_header_stays_buffered() {
        let mut r = FrameReader::new();
        let encoded = frame(b"xy", 3);
        r.append(&encoded[..5]);
        assert!(r.read().unwrap().is_none());
        assert_eq!(r.buffered(), 5);
        r.append(&encoded[5..]);
        assert_eq!(r.read().unwrap().unwrap().payload, b"xy");
    }

    #[test]
    fn oversize_frame_reported_once_then_resync() {
        let mut r = FrameReader::with_max_payload(4);
        let big = frame(b"0123456789", 9);
        let good = frame(b"ok", 10);
        r.append(&big);
        r.append(&good);
        match r.read() {
            Err(ProtoError::OversizeFrame { length, max }) => {
                assert_eq!(length, 10);
                assert_eq!(max, 4);
            }
            other => panic!("expected oversize error, got {other:?}"),
        }
        // The stream resynchronizes on the next frame.
        let f = r.read().unwrap().expect("good frame after resync");
        assert_eq!(f.payload, b"ok");
        assert_eq!(f.header.seq, 10);
    }

    #[test]
    fn oversize_payload_arriving_late_is_discarded() {
        let mut r = FrameReader::with_max_payload(4);
        let big = frame(b"0123456789", 9);
        // Header plus two payload bytes first.
        r.append(&big[..10]);
        assert!(matches!(r.read(), Err(ProtoError::OversizeFrame { .. })));
        assert!(r.read().unwrap().is_none());
        // Rest of the bad payload, then a good frame.
        r.append(&big[10..]);
        r.append(&frame(b"ok", 1));
        let f = r.read().unwrap().expect("resynced");
        assert_eq!(f.payload, b"ok");
    }

    #[test]
    fn read_all_drains_in_order() {
        let mut r = FrameReader::new();
        for i in 0..5u16 {
            r.append(&frame(format!("p{i}").as_bytes(), i));
        }
        let frames = r.read_all();
        assert_eq!(frames.len(), 5);
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.header.seq, i as u16);
            assert_eq!(f.payload, format!("p{i}").as_bytes());
        }
    }
}
