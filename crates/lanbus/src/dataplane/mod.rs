// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data plane: topic-filtered frame delivery between connected nodes.

pub mod frame;
mod tcp;

pub use frame::{Frame, FrameReader};
pub use tcp::{parse_endpoint, TcpDataPlane};

use std::io;

use mio::{Registry, Token};

/// Transport-specific identifier of an upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPlaneEvent {
    /// A frame passed the subscription filters.
    Frame(Frame),
    /// The upstream link to this endpoint closed.
    Disconnected(String),
}

/// Publish/subscribe socket pair.
///
/// Publishing fans a frame out to every attached subscriber; the
/// subscribing side keeps only frames whose topic starts with one of its
/// installed prefixes.
pub trait DataPlane {
    /// Endpoint peers connect to, announced in ADV datagrams.
    fn endpoint(&self) -> &str;

    /// Register with the reactor. Tokens from `base` upward belong to
    /// this data plane.
    fn register(&mut self, registry: &Registry, base: Token) -> io::Result<()>;

    fn add_filter(&mut self, prefix: &str);

    fn remove_filter(&mut self, prefix: &str);

    /// Open an upstream link to a publisher.
    fn connect(&mut self, endpoint: &str) -> io::Result<PeerHandle>;

    /// Publish one frame to every subscriber.
    fn send(&mut self, frame: &Frame) -> io::Result<()>;

    /// Readiness reported by the reactor for one of our tokens.
    fn on_ready(&mut self, token: Token, readable: bool, writable: bool);

    /// Events are queued and waiting for `next_event`.
    fn has_pending(&self) -> bool;

    fn next_event(&mut self) -> Option<DataPlaneEvent>;
}
