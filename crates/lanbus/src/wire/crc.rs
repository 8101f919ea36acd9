// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CRC-16 (polynomial 0x8005, reflected) and the topic-hash alias.
//!
//! The same table serves two conventions:
//!
//! | Use | Seed | Final |
//! |-----|------|-------|
//! | serial value check | 0x0000 | as is |
//! | topic hash | 0xFFFF | inverted |
//!
//! ```
//! use lanbus::wire::crc::{crc16, topic_hash};
//!
//! assert_eq!(crc16(b"123456789", 0), 0xBB3D);
//! assert_eq!(topic_hash("123456789"), 0xB4C8);
//! ```

/// Reflected form of polynomial 0x8005.
const POLY_REFLECTED: u16 = 0xA001;

/// Prefix of every topic-hash alias.
pub const HASH_PREFIX: &str = "$crc";

const CRC_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Running CRC-16 over `data`, starting from `seed`.
#[inline]
#[must_use]
pub fn crc16(data: &[u8], seed: u16) -> u16 {
    let mut crc = seed;
    for &byte in data {
        crc = (crc >> 8) ^ CRC_TABLE[((crc ^ u16::from(byte)) & 0xFF) as usize];
    }
    crc
}

/// 16-bit code a constrained peer uses in place of `topic`.
#[inline]
#[must_use]
pub fn topic_hash(topic: &str) -> u16 {
    !crc16(topic.as_bytes(), 0xFFFF)
}

/// Alias name for a hash code: `$crc` followed by four uppercase hex digits.
pub fn hash_name(code: u16) -> String {
    format!("{}{:04X}", HASH_PREFIX, code)
}

/// `hash_name(topic_hash(topic))`.
pub fn topic_hash_name(topic: &str) -> String {
    hash_name(topic_hash(topic))
}

/// Recover the code from a `$crcXXXX` alias; `None` for ordinary names.
pub fn parse_hash_name(name: &str) -> Option<u16> {
    let hex = name.strip_prefix(HASH_PREFIX)?;
    if hex.len() != 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(hex, 16).ok()
}
