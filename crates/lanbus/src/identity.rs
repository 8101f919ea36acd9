// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node identity: GUID plus the addresses the node is reachable on.

use std::fmt;
use std::net::Ipv4Addr;

/// 128-bit node identifier.
///
/// Generated once per `Node` and carried in every discovery datagram so
/// a node can drop its own broadcast echoes.
///
/// # Display Format
/// Hyphenated lowercase hex: "6f1c0e2a-93b4-4d1e-8b77-0c5ad2e1f3a9"
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct NodeGuid([u8; 16]);

impl NodeGuid {
    /// Fresh random (v4) GUID.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// All-zero GUID, never produced by `generate`.
    pub const fn zero() -> Self {
        Self([0; 16])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for NodeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for NodeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeGuid({})", self)
    }
}

/// Everything a node tells the world about itself. Immutable after `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub guid: NodeGuid,
    /// Local IPv4 address the data plane listens on.
    pub ipv4: Ipv4Addr,
    /// Subnet broadcast address discovery datagrams are sent to.
    pub broadcast: Ipv4Addr,
    /// Data-plane endpoint, e.g. `tcp://192.168.1.20:40111`.
    pub endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique_and_nonzero() {
        let a = NodeGuid::generate();
        let b = NodeGuid::generate();
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert!(NodeGuid::zero().is_zero());
    }

    #[test]
    fn test_display_hyphenated() {
        let guid = NodeGuid::from_bytes([
            0x6f, 0x1c, 0x0e, 0x2a, 0x93, 0xb4, 0x4d, 0x1e, 0x8b, 0x77, 0x0c, 0x5a, 0xd2, 0xe1,
            0xf3, 0xa9,
        ]);
        assert_eq!(guid.to_string(), "6f1c0e2a-93b4-4d1e-8b77-0c5ad2e1f3a9");
    }
}
