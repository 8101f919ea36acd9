// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use lanbus::serial::{RecordBuilder, SerialDecoder};

fuzz_target!(|data: &[u8]| {
    let mut decoder = SerialDecoder::new();
    let mut record = RecordBuilder::new();
    for &byte in data {
        match decoder.feed(byte) {
            Ok(Some(token)) => {
                if let Some(rec) = record.apply(token) {
                    let _ = rec.to_json();
                }
            }
            Ok(None) => {}
            Err(_) => record.poison(),
        }
    }
});
