// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec: message header, discovery datagrams and CRC-16.
//!
//! All multi-byte header fields are little-endian. Decoders work on
//! borrowed slices and report [`DecodeError`] on any length that does not
//! fit the remaining input.

pub mod crc;
pub mod header;
pub mod message;

pub use crc::{crc16, hash_name, parse_hash_name, topic_hash, topic_hash_name};
pub use header::{validate_topic, MessageHeader, MessageType};
pub use message::{decode_datagram, encode_subscribe, AdvertiseMessage, DiscoveryMessage};

use crate::error::DecodeError;

/// Header version emitted by this implementation.
pub const PROTOCOL_VERSION: u16 = 0x0001;

pub const GUID_LEN: usize = 16;
pub const FLAGS_LEN: usize = 16;

/// Longest topic name accepted on the wire.
pub const MAX_TOPIC_LEN: usize = 193;

/// Longest endpoint address carried in an ADV.
pub const MAX_ADDRESS_LEN: usize = 267;

/// Bounds-checked cursor over a received buffer.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.buf.len() - self.pos;
        if n > available {
            return Err(DecodeError::Truncated {
                field,
                needed: n,
                available,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(field, 1)?[0])
    }

    pub(crate) fn u16_le(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let b = self.take(field, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
}
