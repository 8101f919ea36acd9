// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-fed decoder for the serial tagged-value stream.
//!
//! The decoder never blocks: the reactor hands it whatever bytes the port
//! had, one at a time, and it yields a [`SerialToken`] whenever a value is
//! complete. A CRC mismatch is reported as [`Error::LinkIntegrity`] and
//! the decoder goes back to expecting a tag byte.

use serde_json::Value;

use super::codec::{
    fixed_width, subscribers_code, TAG_BUFFER, TAG_CONSOLE_CHAR, TAG_CONSOLE_LONG,
    TAG_CONSOLE_SHORT, TAG_DOUBLE, TAG_END, TAG_FALSE, TAG_FLOAT, TAG_HASH, TAG_INT16, TAG_INT32,
    TAG_INT8, TAG_NULL, TAG_STRING, TAG_TRUE, TAG_UINT16, TAG_UINT32, TAG_UINT8,
};
use crate::error::{Error, Result};
use crate::wire::crc::crc16;

/// One decoded unit of the serial stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SerialToken {
    /// Tag 0x00.
    Text(String),
    /// Tag 0x01, a precomputed topic hash.
    Hash(u16),
    /// Tag 0x01 with the `subscribers` code, followed by hash codes.
    Subscribers(Vec<u16>),
    /// Numeric, boolean, null or buffer value.
    Value(Value),
    /// Human-readable peer output (tags 0xDB/0xDD/0xDE).
    Console(String),
    /// Tag 0xFF.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Tag,
    Fixed(u8),
    Length(u8),
    Body(u8),
    HashCode,
    SubscriberCount,
    SubscriberCodes,
    ConsoleChar,
    ConsoleLen8,
    ConsoleLen16,
    ConsoleBody,
}

#[derive(Debug)]
pub struct SerialDecoder {
    phase: Phase,
    pending: Vec<u8>,
    want: usize,
}

impl Default for SerialDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Tag,
            pending: Vec::with_capacity(16),
            want: 0,
        }
    }

    /// Waiting for a tag byte (no value partially read).
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Tag
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Tag;
        self.pending.clear();
        self.want = 0;
    }

    pub fn feed(&mut self, byte: u8) -> Result<Option<SerialToken>> {
        if self.phase == Phase::Tag {
            return Ok(self.start(byte));
        }
        self.pending.push(byte);
        if self.pending.len() < self.want {
            return Ok(None);
        }
        let phase = self.phase;
        let data = std::mem::take(&mut self.pending);
        self.phase = Phase::Tag;
        self.want = 0;
        self.complete(phase, &data)
    }

    fn expect(&mut self, phase: Phase, want: usize) -> Option<SerialToken> {
        if want == 0 {
            // nothing to read: complete immediately
            return match phase {
                Phase::SubscriberCodes => Some(SerialToken::Subscribers(Vec::new())),
                Phase::ConsoleBody => Some(SerialToken::Console(String::new())),
                _ => None,
            };
        }
        self.phase = phase;
        self.want = want;
        self.pending.clear();
        None
    }

    fn start(&mut self, tag: u8) -> Option<SerialToken> {
        match tag {
            TAG_STRING | TAG_BUFFER => self.expect(Phase::Length(tag), 4),
            TAG_HASH => self.expect(Phase::HashCode, 2),
            TAG_TRUE => Some(SerialToken::Value(Value::Bool(true))),
            TAG_FALSE => Some(SerialToken::Value(Value::Bool(false))),
            TAG_NULL => Some(SerialToken::Value(Value::Null)),
            TAG_CONSOLE_CHAR => self.expect(Phase::ConsoleChar, 1),
            TAG_CONSOLE_SHORT => self.expect(Phase::ConsoleLen8, 1),
            TAG_CONSOLE_LONG => self.expect(Phase::ConsoleLen16, 2),
            TAG_END => Some(SerialToken::End),
            _ => match fixed_width(tag) {
                Some(width) => self.expect(Phase::Fixed(tag), 2 + width),
                None => {
                    log::trace!("[serial] skipping stray byte 0x{:02X}", tag);
                    None
                }
            },
        }
    }

    fn complete(&mut self, phase: Phase, data: &[u8]) -> Result<Option<SerialToken>> {
        match phase {
            Phase::Tag => Ok(None),
            Phase::Fixed(tag) => {
                let value = verified(data)?;
                Ok(Some(SerialToken::Value(fixed_value(tag, value))))
            }
            Phase::Length(tag) => {
                let len = verified(data)?;
                let len = u16::from_le_bytes([len[0], len[1]]) as usize;
                Ok(self.expect(Phase::Body(tag), 2 + len))
            }
            Phase::Body(tag) => {
                let bytes = verified(data)?;
                Ok(Some(if tag == TAG_STRING {
                    SerialToken::Text(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    SerialToken::Value(Value::Array(
                        bytes.iter().map(|&b| Value::from(b)).collect(),
                    ))
                }))
            }
            Phase::HashCode => {
                let code = u16::from_le_bytes([data[0], data[1]]);
                if code == subscribers_code() {
                    Ok(self.expect(Phase::SubscriberCount, 2))
                } else {
                    Ok(Some(SerialToken::Hash(code)))
                }
            }
            Phase::SubscriberCount => {
                let count = u16::from_le_bytes([data[0], data[1]]) as usize;
                Ok(self.expect(Phase::SubscriberCodes, 2 * count))
            }
            Phase::SubscriberCodes => Ok(Some(SerialToken::Subscribers(
                data.chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ))),
            Phase::ConsoleChar => Ok(Some(SerialToken::Console(
                char::from(data[0]).to_string(),
            ))),
            Phase::ConsoleLen8 => Ok(self.expect(Phase::ConsoleBody, data[0] as usize)),
            Phase::ConsoleLen16 => Ok(self.expect(
                Phase::ConsoleBody,
                u16::from_be_bytes([data[0], data[1]]) as usize,
            )),
            Phase::ConsoleBody => Ok(Some(SerialToken::Console(
                String::from_utf8_lossy(data).into_owned(),
            ))),
        }
    }
}

/// Split `crc(2) | bytes` and check the CRC.
fn verified(data: &[u8]) -> Result<&[u8]> {
    let actual = u16::from_le_bytes([data[0], data[1]]);
    let bytes = &data[2..];
    let expected = crc16(bytes, 0);
    if expected != actual {
        return Err(Error::LinkIntegrity { expected, actual });
    }
    Ok(bytes)
}

fn fixed_value(tag: u8, b: &[u8]) -> Value {
    match tag {
        TAG_INT8 => Value::from(b[0] as i8),
        TAG_UINT8 => Value::from(b[0]),
        TAG_INT16 => Value::from(i16::from_le_bytes([b[0], b[1]])),
        TAG_UINT16 => Value::from(u16::from_le_bytes([b[0], b[1]])),
        TAG_INT32 => Value::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        TAG_UINT32 => Value::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        TAG_FLOAT => Value::from(f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
        TAG_DOUBLE => Value::from(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ])),
        _ => Value::Null,
    }
}
