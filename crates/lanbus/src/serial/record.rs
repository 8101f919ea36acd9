// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial records: tokens to JSON objects and back.
//!
//! Inbound, the first text/hash token of a message names the topic, the
//! next one is a key, and each following value is stored under the
//! pending key. Outbound, a JSON object is re-encoded field by field with
//! hashed keys for the peer.

use serde_json::{Map, Value};

use super::codec::SerialEncoder;
use super::decoder::SerialToken;
use crate::wire::crc::{hash_name, parse_hash_name, topic_hash};

/// A complete message ready for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialRecord {
    pub topic: String,
    pub fields: Map<String, Value>,
}

impl SerialRecord {
    /// Compact JSON object text, fields in arrival order.
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// Accumulates tokens between two end tags.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    topic: Option<String>,
    key: Option<String>,
    fields: Map<String, Value>,
    poisoned: bool,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.topic.is_some()
    }

    /// Drop the record in progress; the rest of the message is ignored.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn name(&mut self, name: String) {
        if self.topic.is_none() {
            self.topic = Some(name);
        } else if self.key.is_none() {
            self.key = Some(name);
        } else {
            self.value(Value::String(name));
        }
    }

    fn value(&mut self, value: Value) {
        match self.key.take() {
            Some(key) => {
                self.fields.insert(key, value);
            }
            None => log::debug!("[serial] value without a key discarded: {}", value),
        }
    }

    /// Feed one data token. `End` closes the message and returns the
    /// record unless it was poisoned or never named a topic.
    pub fn apply(&mut self, token: SerialToken) -> Option<SerialRecord> {
        if self.poisoned && token != SerialToken::End {
            return None;
        }
        match token {
            SerialToken::Text(text) => self.name(text),
            SerialToken::Hash(code) => self.name(hash_name(code)),
            SerialToken::Value(value) => self.value(value),
            SerialToken::End => {
                let done = std::mem::take(self);
                if done.poisoned {
                    return None;
                }
                return done.topic.map(|topic| SerialRecord {
                    topic,
                    fields: done.fields,
                });
            }
            SerialToken::Subscribers(_) | SerialToken::Console(_) => {}
        }
        None
    }
}

/// Encode a bus message for a forwarding peer.
///
/// Layout: topic code (2 bytes LE), then `hash(key) value` per field,
/// then the end tag. The topic code is parsed back from `$crcXXXX`
/// aliases and computed for plain names. Returns `None` if the payload is
/// not a JSON object.
pub fn encode_forward(topic: &str, payload: &[u8]) -> Option<Vec<u8>> {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(payload) else {
        return None;
    };
    let code = parse_hash_name(topic).unwrap_or_else(|| topic_hash(topic));

    let mut enc = SerialEncoder::new();
    enc.raw(&code.to_le_bytes());
    for (key, value) in &fields {
        if !encodable(value) {
            log::debug!("[serial] field '{}' on '{}' not forwardable", key, topic);
            continue;
        }
        enc.string_hash(key);
        encode_value(&mut enc, value);
    }
    enc.end();
    Some(enc.into_bytes())
}

fn byte_array(items: &[Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

fn encodable(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => byte_array(items).is_some(),
        _ => true,
    }
}

fn encode_value(enc: &mut SerialEncoder, value: &Value) {
    match value {
        Value::Null => {
            enc.null();
        }
        Value::Bool(b) => {
            enc.boolean(*b);
        }
        Value::Number(n) => {
            if let Some(v) = n.as_i64().and_then(|v| i32::try_from(v).ok()) {
                enc.int32(v);
            } else if let Some(v) = n.as_u64().and_then(|v| u32::try_from(v).ok()) {
                enc.uint32(v);
            } else {
                enc.float(n.as_f64().unwrap_or(0.0) as f32);
            }
        }
        Value::String(s) => {
            enc.string(s);
        }
        Value::Array(items) => {
            if let Some(bytes) = byte_array(items) {
                enc.buffer(&bytes);
            }
        }
        Value::Object(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::decoder::SerialDecoder;
    use serde_json::json;

    fn build(bytes: &[u8]) -> Vec<SerialRecord> {
        let mut dec = SerialDecoder::new();
        let mut rec = RecordBuilder::new();
        let mut out = Vec::new();
        for &b in bytes {
            match dec.feed(b) {
                Ok(Some(token)) => out.extend(rec.apply(token)),
                Ok(None) => {}
                Err(_) => rec.poison(),
            }
        }
        out
    }

    #[test]
    fn test_topic_key_value() {
        let mut enc = SerialEncoder::new();
        enc.string("T").string("k").int32(42).end();
        let records = build(enc.as_bytes());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "T");
        assert_eq!(records[0].to_json(), r#"{"k":42}"#);
    }

    #[test]
    fn test_field_order_and_string_values() {
        let mut enc = SerialEncoder::new();
        enc.string("status")
            .string("zeta")
            .boolean(true)
            .string("alpha")
            .string("ok")
            .end();
        let records = build(enc.as_bytes());
        assert_eq!(records[0].to_json(), r#"{"zeta":true,"alpha":"ok"}"#);
    }

    #[test]
    fn test_hash_names() {
        let mut enc = SerialEncoder::new();
        enc.hash_code(0x0A0B).string_hash("speed").float(2.5).end();
        let records = build(enc.as_bytes());
        assert_eq!(records[0].topic, "$crc0A0B");
        assert_eq!(
            records[0].fields.get(&hash_name(topic_hash("speed"))),
            Some(&json!(2.5))
        );
    }

    #[test]
    fn test_keyless_value_discarded() {
        let mut enc = SerialEncoder::new();
        enc.string("T").int8(1).string("k").int8(2).int8(3).end();
        assert_eq!(build(enc.as_bytes())[0].to_json(), r#"{"k":2}"#);
    }

    #[test]
    fn test_end_without_topic_yields_nothing() {
        let mut enc = SerialEncoder::new();
        enc.int8(1).end();
        assert!(build(enc.as_bytes()).is_empty());
    }

    #[test]
    fn test_poisoned_record_dropped_next_one_kept() {
        let mut bad = SerialEncoder::new();
        bad.string("T").string("k").int32(42);
        let mut bytes = bad.into_bytes();
        let last = bytes.len() - 5;
        bytes[last] ^= 0x04; // CRC byte of the int32
        let mut tail = SerialEncoder::new();
        tail.string("j").int8(1).end();
        tail.string("U").string("k").int8(9).end();
        bytes.extend_from_slice(tail.as_bytes());

        let records = build(&bytes);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "U");
        assert_eq!(records[0].to_json(), r#"{"k":9}"#);
    }

    #[test]
    fn test_encode_forward() {
        let payload = br#"{"on":true,"n":-3,"big":3000000000,"x":0.5,"s":"hi","b":[1,2],"nil":null,"o":{}}"#;
        let bytes = encode_forward("$crc1234", payload).expect("object payload");
        assert_eq!(&bytes[..2], &[0x34, 0x12]);

        let mut expected = SerialEncoder::new();
        expected
            .raw(&[0x34, 0x12])
            .string_hash("on")
            .boolean(true)
            .string_hash("n")
            .int32(-3)
            .string_hash("big")
            .uint32(3_000_000_000)
            .string_hash("x")
            .float(0.5)
            .string_hash("s")
            .string("hi")
            .string_hash("b")
            .buffer(&[1, 2])
            .string_hash("nil")
            .null()
            .end();
        assert_eq!(bytes, expected.into_bytes());
    }

    #[test]
    fn test_encode_forward_plain_topic_and_rejects() {
        let bytes = encode_forward("lights", br#"{}"#).expect("object");
        assert_eq!(bytes[..2], topic_hash("lights").to_le_bytes());
        assert_eq!(bytes[2], 0xFF);
        assert!(encode_forward("lights", b"[1,2]").is_none());
        assert!(encode_forward("lights", b"not json").is_none());
    }
}
