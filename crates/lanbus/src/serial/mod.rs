// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial bridge to microcontroller peers.
//!
//! A peer speaks the tagged-value protocol in [`codec`]; each message is
//! decoded into a JSON record and published on the bus, and bus messages
//! on topics the peer subscribed to are forwarded back to it.

pub mod codec;
pub mod decoder;
mod link;
#[cfg(unix)]
mod port;
pub mod record;

pub use decoder::{SerialDecoder, SerialToken};
pub use link::{LinkEvent, LinkStats, SerialLink};
#[cfg(unix)]
pub use port::SerialPort;
pub use record::{encode_forward, RecordBuilder, SerialRecord};

use std::io::{Read, Write};
#[cfg(unix)]
use std::os::fd::RawFd;

/// Identifies an attached serial link within one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerialId(usize);

impl SerialId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SerialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "serial#{}", self.0)
    }
}

/// Byte stream to a serial peer.
///
/// Reads and writes must not block: return `WouldBlock` when nothing can
/// move. Ports backed by a descriptor expose it for reactor registration;
/// in-memory ports report buffered input through `has_pending` instead.
pub trait SerialIo: Read + Write {
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }

    fn has_pending(&self) -> bool {
        false
    }
}
