// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Brokerless publish/subscribe bus for local networks and serial peers.
//!
//! Nodes find each other with UDP broadcasts and exchange data over
//! point-to-point TCP links. A node can also bridge microcontrollers on a
//! serial line into the same topic space.
//!
//! # Architecture
//!
//! ```text
//!   publisher node                         subscriber node
//!        |                                       |
//!        |<------------- SUB(topic) -------------|   UDP broadcast
//!        |-------------- ADV(topic, tcp://..) -->|
//!        |<============= TCP connect ============|
//!        |== [topic][header][payload] ==========>|   data plane
//!
//!   MCU ~~~ tagged values + CRC ~~~> bridge node ---> bus
//! ```
//!
//! # Key Features
//!
//! - **No broker**: ADV/SUB datagrams carry a node GUID so self-echoes are
//!   dropped, and a SUB makes publishers re-announce themselves
//! - **Single thread**: one [`Node`] owns every socket and registry; the
//!   reactor services serial links, discovery and data in that order
//! - **Serial bridge**: CRC-16 checked values, resynchronising on errors,
//!   with a non-blocking forward handshake back to the peer
//! - **Hash aliases**: `$crcXXXX` topic names let constrained peers use a
//!   2-byte code instead of a string

pub mod config;
pub mod dataplane;
pub mod discovery;
pub mod error;
pub mod identity;
mod node;
pub mod registry;
pub mod serial;
pub mod wire;

pub use config::NodeConfig;
pub use dataplane::{DataPlane, DataPlaneEvent, Frame, PeerHandle, TcpDataPlane};
pub use discovery::{DiscoverySocket, UdpDiscovery};
pub use error::{DecodeError, Error, Result};
pub use identity::{NodeGuid, NodeIdentity};
pub use node::{Node, StopHandle, TimerCallback};
pub use serial::{LinkStats, SerialId, SerialIo};
#[cfg(unix)]
pub use serial::SerialPort;
pub use wire::{topic_hash, topic_hash_name};
