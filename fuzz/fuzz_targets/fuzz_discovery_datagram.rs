// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use lanbus::wire::{decode_datagram, DiscoveryMessage};

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must re-encode to the bytes it came from
    if let Ok(message) = decode_datagram(data) {
        let bytes = match &message {
            DiscoveryMessage::Advertise(adv) => adv.to_bytes(),
            DiscoveryMessage::Subscribe(hdr) | DiscoveryMessage::Publish(hdr) => hdr.to_bytes(),
        };
        if let Ok(bytes) = bytes {
            assert_eq!(&data[..bytes.len()], bytes.as_slice());
        }
    }
});
