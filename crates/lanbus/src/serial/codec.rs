// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagged-value encoding spoken with serial peers.
//!
//! Every value starts with a one-byte tag. Checked values carry a CRC-16
//! (seed 0) of their little-endian bytes ahead of the bytes themselves:
//!
//! ```text
//! fixed:   tag | crc(2) | value(1..8)
//! string:  tag | crc(len) (2) | len (2) | crc(bytes) (2) | bytes
//! hash:    0x01 | code (2)
//! ```
//!
//! All multi-byte integers are little-endian except the `0xDE` console
//! length, which is big-endian.

use crate::wire::crc::{crc16, topic_hash};

pub const TAG_STRING: u8 = 0x00;
pub const TAG_HASH: u8 = 0x01;
pub const TAG_INT8: u8 = 0x02;
pub const TAG_INT16: u8 = 0x03;
pub const TAG_INT32: u8 = 0x04;
pub const TAG_UINT8: u8 = 0x05;
pub const TAG_UINT16: u8 = 0x06;
pub const TAG_UINT32: u8 = 0x07;
pub const TAG_FLOAT: u8 = 0x08;
pub const TAG_DOUBLE: u8 = 0x09;
pub const TAG_TRUE: u8 = 0x0A;
pub const TAG_FALSE: u8 = 0x0B;
pub const TAG_NULL: u8 = 0x0C;
pub const TAG_BUFFER: u8 = 0x0D;
pub const TAG_CONSOLE_CHAR: u8 = 0xDB;
pub const TAG_CONSOLE_SHORT: u8 = 0xDD;
pub const TAG_CONSOLE_LONG: u8 = 0xDE;
pub const TAG_END: u8 = 0xFF;

/// Acknowledgment written after each top-level message, and once on attach.
pub const ACK: u8 = b'A';
/// Bridge has a message for the peer.
pub const READY: u8 = b'D';
/// Peer is ready to receive it.
pub const REQUEST: u8 = b'R';

/// Reserved key whose hash introduces a subscription list.
pub const SUBSCRIBERS_KEY: &str = "subscribers";

/// `topic_hash("subscribers")`.
pub fn subscribers_code() -> u16 {
    topic_hash(SUBSCRIBERS_KEY)
}

/// Width of the value bytes for fixed-size tags.
pub fn fixed_width(tag: u8) -> Option<usize> {
    match tag {
        TAG_INT8 | TAG_UINT8 => Some(1),
        TAG_INT16 | TAG_UINT16 => Some(2),
        TAG_INT32 | TAG_UINT32 | TAG_FLOAT => Some(4),
        TAG_DOUBLE => Some(8),
        _ => None,
    }
}

/// Appends tagged values to a byte buffer.
#[derive(Debug, Default)]
pub struct SerialEncoder {
    buf: Vec<u8>,
}

impl SerialEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn checked(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&crc16(bytes, 0).to_le_bytes());
        self.buf.extend_from_slice(bytes);
    }

    fn sized(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        let len = bytes.len().min(u16::MAX as usize);
        self.buf.push(tag);
        self.checked(&(len as u16).to_le_bytes());
        self.checked(&bytes[..len]);
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.sized(TAG_STRING, s.as_bytes())
    }

    pub fn buffer(&mut self, bytes: &[u8]) -> &mut Self {
        self.sized(TAG_BUFFER, bytes)
    }

    /// Tag 0x01 carrying `code` as is.
    pub fn hash_code(&mut self, code: u16) -> &mut Self {
        self.buf.push(TAG_HASH);
        self.buf.extend_from_slice(&code.to_le_bytes());
        self
    }

    /// Tag 0x01 carrying the hash of `s`.
    pub fn string_hash(&mut self, s: &str) -> &mut Self {
        self.hash_code(topic_hash(s))
    }

    /// Subscription directive: `0x01 hash("subscribers") count codes...`.
    pub fn subscribers(&mut self, codes: &[u16]) -> &mut Self {
        self.hash_code(subscribers_code());
        self.buf
            .extend_from_slice(&(codes.len() as u16).to_le_bytes());
        for code in codes {
            self.buf.extend_from_slice(&code.to_le_bytes());
        }
        self
    }

    fn fixed(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        self.buf.push(tag);
        self.checked(bytes);
        self
    }

    pub fn int8(&mut self, v: i8) -> &mut Self {
        self.fixed(TAG_INT8, &v.to_le_bytes())
    }

    pub fn int16(&mut self, v: i16) -> &mut Self {
        self.fixed(TAG_INT16, &v.to_le_bytes())
    }

    pub fn int32(&mut self, v: i32) -> &mut Self {
        self.fixed(TAG_INT32, &v.to_le_bytes())
    }

    pub fn uint8(&mut self, v: u8) -> &mut Self {
        self.fixed(TAG_UINT8, &v.to_le_bytes())
    }

    pub fn uint16(&mut self, v: u16) -> &mut Self {
        self.fixed(TAG_UINT16, &v.to_le_bytes())
    }

    pub fn uint32(&mut self, v: u32) -> &mut Self {
        self.fixed(TAG_UINT32, &v.to_le_bytes())
    }

    pub fn float(&mut self, v: f32) -> &mut Self {
        self.fixed(TAG_FLOAT, &v.to_le_bytes())
    }

    pub fn double(&mut self, v: f64) -> &mut Self {
        self.fixed(TAG_DOUBLE, &v.to_le_bytes())
    }

    pub fn boolean(&mut self, v: bool) -> &mut Self {
        self.buf.push(if v { TAG_TRUE } else { TAG_FALSE });
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.buf.push(TAG_NULL);
        self
    }

    pub fn console(&mut self, text: &str) -> &mut Self {
        let bytes = &text.as_bytes()[..text.len().min(u8::MAX as usize)];
        self.buf.push(TAG_CONSOLE_SHORT);
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn end(&mut self) -> &mut Self {
        self.buf.push(TAG_END);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_layout() {
        let mut enc = SerialEncoder::new();
        enc.int32(42);
        let crc = crc16(&42i32.to_le_bytes(), 0);
        let mut expected = vec![TAG_INT32];
        expected.extend_from_slice(&crc.to_le_bytes());
        expected.extend_from_slice(&[42, 0, 0, 0]);
        assert_eq!(enc.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_string_layout() {
        let mut enc = SerialEncoder::new();
        enc.string("hi");
        let bytes = enc.into_bytes();
        assert_eq!(bytes[0], TAG_STRING);
        assert_eq!(
            u16::from_le_bytes([bytes[1], bytes[2]]),
            crc16(&[2, 0], 0)
        );
        assert_eq!(&bytes[3..5], &[2, 0]);
        assert_eq!(u16::from_le_bytes([bytes[5], bytes[6]]), crc16(b"hi", 0));
        assert_eq!(&bytes[7..], b"hi");
    }

    #[test]
    fn test_subscribers_directive() {
        let mut enc = SerialEncoder::new();
        enc.subscribers(&[0x1234, 0xABCD]);
        let code = subscribers_code().to_le_bytes();
        assert_eq!(
            enc.as_bytes(),
            &[TAG_HASH, code[0], code[1], 2, 0, 0x34, 0x12, 0xCD, 0xAB]
        );
    }

    #[test]
    fn test_flag_tags_have_no_payload() {
        let mut enc = SerialEncoder::new();
        enc.boolean(true).boolean(false).null().end();
        assert_eq!(enc.as_bytes(), &[0x0A, 0x0B, 0x0C, 0xFF]);
    }
}
