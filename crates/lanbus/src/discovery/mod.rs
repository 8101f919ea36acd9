// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broadcast discovery.
//!
//! Stateless request/response over the discovery port:
//!
//! - ADV: "topic T is published at endpoint E". Receivers that do not yet
//!   have a link to E connect to it.
//! - SUB: "someone wants topic T". Nodes publishing T answer with an ADV
//!   so late subscribers find them.
//!
//! The decisions live here as pure functions; the node applies them.

mod udp;

pub use udp::UdpDiscovery;

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use mio::{Registry, Token};

use crate::identity::NodeGuid;
use crate::registry::{ConnectionRegistry, TopicRegistry};
use crate::wire::{AdvertiseMessage, MessageHeader, PROTOCOL_VERSION};

/// Endpoint scheme accepted in ADV datagrams.
pub const TCP_SCHEME: &str = "tcp://";

/// Datagram socket carrying ADV/SUB.
pub trait DiscoverySocket {
    /// Register for readability with the reactor.
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()>;

    /// Send one datagram to the subnet broadcast address.
    fn broadcast(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram; `Ok(None)` when nothing is queued.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Data available without a readiness event (in-memory sockets).
    fn has_pending(&self) -> bool {
        false
    }
}

/// What to do with a received ADV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiseAction {
    /// Open an upstream link to this endpoint.
    Connect(String),
    /// Our own broadcast echoed back.
    SelfEcho,
    /// A link to the endpoint already exists.
    AlreadyConnected,
    /// Endpoint is not `tcp://...`.
    UnsupportedEndpoint,
    /// Header version this node does not speak.
    VersionMismatch(u16),
}

/// What to do with a received SUB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeAction {
    /// Re-send our ADV for the topic.
    Readvertise(String),
    Ignore,
}

pub fn on_advertise(
    local: NodeGuid,
    adv: &AdvertiseMessage,
    connections: &ConnectionRegistry,
) -> AdvertiseAction {
    if adv.header.version != PROTOCOL_VERSION {
        return AdvertiseAction::VersionMismatch(adv.header.version);
    }
    if adv.header.guid == local {
        return AdvertiseAction::SelfEcho;
    }
    if !adv.address.starts_with(TCP_SCHEME) {
        return AdvertiseAction::UnsupportedEndpoint;
    }
    if connections.has(&adv.address) {
        return AdvertiseAction::AlreadyConnected;
    }
    AdvertiseAction::Connect(adv.address.clone())
}

pub fn on_subscribe(
    local: NodeGuid,
    header: &MessageHeader,
    topics: &TopicRegistry,
) -> SubscribeAction {
    if header.version != PROTOCOL_VERSION || header.guid == local {
        return SubscribeAction::Ignore;
    }
    if topics.is_advertised(&header.topic) {
        SubscribeAction::Readvertise(header.topic.clone())
    } else {
        SubscribeAction::Ignore
    }
}

/// Subnet broadcast address for `ip`: the last octet set to 255.
pub fn broadcast_address(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// Local IPv4 address the node announces.
///
/// Uses `preferred` when set, otherwise the first non-loopback IPv4
/// interface; falls back to loopback on hosts with no network.
pub fn local_ipv4(preferred: Option<Ipv4Addr>) -> io::Result<Ipv4Addr> {
    if let Some(ip) = preferred {
        log::debug!("[discovery] using configured interface {}", ip);
        return Ok(ip);
    }

    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::other(format!("cannot list interfaces: {}", e)))?;

    for (name, ip) in interfaces {
        if let IpAddr::V4(ipv4) = ip {
            if !ipv4.is_loopback() && !ipv4.is_unspecified() {
                log::debug!("[discovery] using interface {} ({})", name, ipv4);
                return Ok(ipv4);
            }
        }
    }

    log::warn!("[discovery] no non-loopback IPv4 interface, using 127.0.0.1");
    Ok(Ipv4Addr::LOCALHOST)
}
