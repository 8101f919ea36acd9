// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use lanbus::dataplane::FrameReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = FrameReader::new(4096);
    // Split the input so partial parts are exercised too
    let mid = data.len() / 2;
    for chunk in [&data[..mid], &data[mid..]] {
        reader.extend(chunk);
        loop {
            match reader.next_frame() {
                Ok(Some(frame)) => {
                    let _ = frame.encode();
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
});
