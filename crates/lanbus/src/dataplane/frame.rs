// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Three-part data-plane frame and its length-prefixed stream encoding.
//!
//! ```text
//! +------------+-------+------------+--------+------------+---------+
//! | len (4 BE) | topic | len (4 BE) | header | len (4 BE) | payload |
//! +------------+-------+------------+--------+------------+---------+
//! ```
//!
//! The topic part comes first so receivers can apply prefix filters
//! without decoding the header.

use crate::error::{DecodeError, Result};
use crate::identity::NodeGuid;
use crate::wire::{MessageHeader, MessageType};

/// Length prefix size of each part.
pub const PART_HEADER_SIZE: usize = 4;

const PARTS: usize = 3;

/// One published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Frame for a local publication on `topic`.
    pub fn publish(guid: NodeGuid, topic: &str, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_owned(),
            header: MessageHeader::new(guid, topic, MessageType::Publish),
            payload: payload.to_vec(),
        }
    }

    /// Stream encoding of all three parts.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = self.header.to_bytes()?;
        let mut buf = Vec::with_capacity(
            PARTS * PART_HEADER_SIZE + self.topic.len() + header.len() + self.payload.len(),
        );
        for part in [self.topic.as_bytes(), &header, &self.payload] {
            buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
            buf.extend_from_slice(part);
        }
        Ok(buf)
    }
}

/// Incremental decoder for one TCP stream.
///
/// Bytes are appended as they arrive; complete frames are consumed by
/// advancing a read offset, and the consumed prefix is compacted away on
/// the next `extend`. A part larger than `max_part` is fatal for the
/// stream.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    start: usize,
    max_part: usize,
}

impl FrameReader {
    pub fn new(max_part: usize) -> Self {
        Self {
            buffer: Vec::new(),
            start: 0,
            max_part,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Offsets of the three parts if a whole frame is buffered.
    fn complete_frame(&self) -> std::result::Result<Option<[(usize, usize); PARTS]>, DecodeError> {
        let mut spans = [(0usize, 0usize); PARTS];
        let mut pos = self.start;
        for span in &mut spans {
            let Some(prefix) = self.buffer.get(pos..pos + PART_HEADER_SIZE) else {
                return Ok(None);
            };
            let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            if len > self.max_part {
                return Err(DecodeError::FrameTooLarge {
                    size: len,
                    max: self.max_part,
                });
            }
            pos += PART_HEADER_SIZE;
            if self.buffer.len() - pos < len {
                return Ok(None);
            }
            *span = (pos, pos + len);
            pos += len;
        }
        Ok(Some(spans))
    }

    /// Next complete frame, `Ok(None)` if more bytes are needed.
    ///
    /// A frame with a malformed topic or header is consumed and reported
    /// as an error; the stream stays usable. `FrameTooLarge` is not
    /// recoverable.
    pub fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        let Some([topic, header, payload]) = self.complete_frame()? else {
            return Ok(None);
        };

        let decoded = std::str::from_utf8(&self.buffer[topic.0..topic.1])
            .map_err(|_| DecodeError::InvalidUtf8("frame topic"))
            .and_then(|topic_str| {
                let (hdr, _) = MessageHeader::parse(&self.buffer[header.0..header.1])?;
                Ok(Frame {
                    topic: topic_str.to_owned(),
                    header: hdr,
                    payload: self.buffer[payload.0..payload.1].to_vec(),
                })
            });

        self.start = payload.1;
        if self.start == self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        }
        decoded.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::publish(NodeGuid::generate(), "imu", br#"{"ax":0.1}"#)
    }

    #[test]
    fn test_parts_are_length_prefixed() {
        let bytes = frame().encode().expect("encode");
        assert_eq!(&bytes[..4], &[0, 0, 0, 3]);
        assert_eq!(&bytes[4..7], b"imu");
        let header_len = u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;
        assert_eq!(header_len, 36 + 3);
        let tail = &bytes[11 + header_len..];
        assert_eq!(&tail[..4], &[0, 0, 0, 10]);
        assert_eq!(&tail[4..], br#"{"ax":0.1}"#);
    }

    #[test]
    fn test_byte_at_a_time() {
        let first = frame();
        let second = Frame::publish(first.header.guid, "gps", b"");
        let mut stream = first.encode().expect("encode");
        stream.extend(second.encode().expect("encode"));

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        for b in stream {
            reader.extend(&[b]);
            while let Some(f) = reader.next_frame().expect("decode") {
                out.push(f);
            }
        }
        assert_eq!(out, vec![first, second]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_burst_in_one_read() {
        let guid = NodeGuid::generate();
        let sent: Vec<Frame> = (0..50)
            .map(|i| Frame::publish(guid, "burst", format!("{}", i).as_bytes()))
            .collect();
        let mut stream = Vec::new();
        for f in &sent {
            stream.extend(f.encode().expect("encode"));
        }
        // keep half a frame back so the compaction path is exercised
        let split = stream.len() - 10;

        let mut reader = FrameReader::new(1024);
        reader.extend(&stream[..split]);
        let mut out = Vec::new();
        while let Some(f) = reader.next_frame().expect("decode") {
            out.push(f);
        }
        assert_eq!(out.len(), 49);
        assert!(reader.buffered() > 0);

        reader.extend(&stream[split..]);
        while let Some(f) = reader.next_frame().expect("decode") {
            out.push(f);
        }
        assert_eq!(out, sent);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_oversized_part_is_fatal() {
        let mut reader = FrameReader::new(8);
        reader.extend(&[0, 0, 0, 9]);
        assert_eq!(
            reader.next_frame(),
            Err(DecodeError::FrameTooLarge { size: 9, max: 8 })
        );
    }

    #[test]
    fn test_bad_header_skips_frame() {
        let mut bad = Vec::new();
        for part in [&b"t"[..], &b"junk"[..], &b"p"[..]] {
            bad.extend_from_slice(&(part.len() as u32).to_be_bytes());
            bad.extend_from_slice(part);
        }
        let good = frame();
        let mut reader = FrameReader::new(1024);
        reader.extend(&bad);
        reader.extend(&good.encode().expect("encode"));
        assert!(matches!(
            reader.next_frame(),
            Err(DecodeError::Truncated { .. })
        ));
        assert_eq!(reader.next_frame().expect("decode"), Some(good));
    }
}
