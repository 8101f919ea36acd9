// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Common message header shared by discovery datagrams and data-plane frames.
//!
//! ```text
//! +---------+----------+-----+-----------+------+-----------+
//! | version | guid     | len | topic     | type | flags     |
//! | u16 LE  | 16 bytes | u8  | len bytes | u8   | 16 zeroes |
//! +---------+----------+-----+-----------+------+-----------+
//! ```

use super::{Reader, FLAGS_LEN, GUID_LEN, MAX_TOPIC_LEN, PROTOCOL_VERSION};
use crate::error::{DecodeError, Error, Result};
use crate::identity::NodeGuid;

/// Message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Advertise = 1,
    Subscribe = 2,
    /// Data-plane only; never sent on the discovery port.
    Publish = 3,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Advertise),
            2 => Some(Self::Subscribe),
            3 => Some(Self::Publish),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub guid: NodeGuid,
    pub topic: String,
    pub kind: MessageType,
    pub flags: [u8; FLAGS_LEN],
}

impl MessageHeader {
    /// Header with the current protocol version and zeroed flags.
    pub fn new(guid: NodeGuid, topic: impl Into<String>, kind: MessageType) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            guid,
            topic: topic.into(),
            kind,
            flags: [0; FLAGS_LEN],
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        2 + GUID_LEN + 1 + self.topic.len() + 1 + FLAGS_LEN
    }

    /// Append the encoded header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_topic(&self.topic)?;
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.guid.as_bytes());
        buf.push(self.topic.len() as u8);
        buf.extend_from_slice(self.topic.as_bytes());
        buf.push(self.kind.as_u8());
        buf.extend_from_slice(&self.flags);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Decode a header; returns it with the number of bytes consumed.
    pub fn parse(buf: &[u8]) -> std::result::Result<(Self, usize), DecodeError> {
        let mut reader = Reader::new(buf);
        let header = Self::read(&mut reader)?;
        Ok((header, reader.position()))
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        let version = reader.u16_le("version")?;

        let mut guid = [0u8; GUID_LEN];
        guid.copy_from_slice(reader.take("guid", GUID_LEN)?);

        let topic_len = reader.u8("topic length")? as usize;
        if topic_len > MAX_TOPIC_LEN {
            return Err(DecodeError::TopicTooLong(topic_len));
        }
        let topic = std::str::from_utf8(reader.take("topic", topic_len)?)
            .map_err(|_| DecodeError::InvalidUtf8("topic"))?
            .to_owned();

        let raw_kind = reader.u8("message type")?;
        let kind = MessageType::from_u8(raw_kind).ok_or(DecodeError::UnknownMessageType(raw_kind))?;

        let mut flags = [0u8; FLAGS_LEN];
        flags.copy_from_slice(reader.take("flags", FLAGS_LEN)?);

        Ok(Self {
            version,
            guid: NodeGuid::from_bytes(guid),
            topic,
            kind,
            flags,
        })
    }
}

/// Topic names must be non-empty and at most [`MAX_TOPIC_LEN`] bytes.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::InvalidArgument("empty topic name".into()));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(Error::InvalidArgument(format!(
            "topic '{}...' is {} bytes (max {})",
            topic.chars().take(16).collect::<String>(),
            topic.len(),
            MAX_TOPIC_LEN
        )));
    }
    Ok(())
}
