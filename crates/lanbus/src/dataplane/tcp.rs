// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe sockets over non-blocking TCP.
//!
//! ```text
//!   publisher node                       subscriber node
//!  +---------------+   accepted stream  +----------------+
//!  | TcpListener   |<-------------------| connect(ep)    |
//!  | (downstream)  |--- every frame --->| (upstream)     |
//!  +---------------+                    |  prefix filter |
//!                                       +----------------+
//! ```
//!
//! Streams are registered on the node's `mio::Poll` under tokens starting
//! at the base token handed to `register`; the listener takes the base.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

use super::frame::{Frame, FrameReader};
use super::{DataPlane, DataPlaneEvent, PeerHandle};
use crate::discovery::TCP_SCHEME;
use crate::error::DecodeError;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    /// Accepted from a subscriber; receives everything we publish.
    Downstream(SocketAddr),
    /// Connected to a publisher's endpoint; we read its frames.
    Upstream(String),
}

struct Peer {
    stream: TcpStream,
    role: Role,
    reader: FrameReader,
    outbuf: Vec<u8>,
}

/// Parse `tcp://a.b.c.d:port`.
pub fn parse_endpoint(endpoint: &str) -> io::Result<SocketAddr> {
    endpoint
        .strip_prefix(TCP_SCHEME)
        .and_then(|rest| rest.parse::<SocketAddr>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid endpoint '{}'", endpoint),
            )
        })
}

pub struct TcpDataPlane {
    listener: TcpListener,
    endpoint: String,
    registry: Option<Registry>,
    base: Token,
    next_token: usize,
    peers: HashMap<Token, Peer>,
    filters: Vec<String>,
    inbox: VecDeque<DataPlaneEvent>,
    max_part: usize,
    max_backlog: usize,
    scratch: Vec<u8>,
}

impl TcpDataPlane {
    /// Bind a listener on `ip` with an ephemeral port.
    pub fn bind(ip: Ipv4Addr, max_part: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::V4(SocketAddrV4::new(ip, 0)))?;
        let local = listener.local_addr()?;
        let endpoint = format!("{}{}:{}", TCP_SCHEME, ip, local.port());
        log::debug!("[tcp] listening on {}", endpoint);
        Ok(Self {
            listener,
            endpoint,
            registry: None,
            base: Token(0),
            next_token: 0,
            peers: HashMap::new(),
            filters: Vec::new(),
            inbox: VecDeque::new(),
            max_part,
            max_backlog: max_part.saturating_mul(4),
            scratch: vec![0u8; READ_CHUNK],
        })
    }

    fn matches_filter(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| topic.starts_with(f.as_str()))
    }

    fn allocate_token(&mut self) -> Token {
        self.next_token += 1;
        Token(self.base.0 + self.next_token)
    }

    fn add_peer(&mut self, mut stream: TcpStream, role: Role) -> io::Result<Token> {
        let token = self.allocate_token();
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| io::Error::other("data plane not registered with a poll"))?;
        registry.register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
        let _ = stream.set_nodelay(true);
        self.peers.insert(
            token,
            Peer {
                stream,
                role,
                reader: FrameReader::new(self.max_part),
                outbuf: Vec::new(),
            },
        );
        Ok(token)
    }

    fn close_peer(&mut self, token: Token, reason: &str) {
        let Some(mut peer) = self.peers.remove(&token) else {
            return;
        };
        if let Some(registry) = &self.registry {
            let _ = registry.deregister(&mut peer.stream);
        }
        match peer.role {
            Role::Upstream(endpoint) => {
                log::info!("[tcp] publisher {} disconnected: {}", endpoint, reason);
                self.inbox.push_back(DataPlaneEvent::Disconnected(endpoint));
            }
            Role::Downstream(addr) => {
                log::debug!("[tcp] subscriber {} dropped: {}", addr, reason);
            }
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => match self.add_peer(stream, Role::Downstream(addr)) {
                    Ok(token) => log::debug!("[tcp] subscriber {} attached ({:?})", addr, token),
                    Err(e) => log::warn!("[tcp] failed to register subscriber {}: {}", addr, e),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("[tcp] accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Drain the socket into the peer's reader. Returns a close reason.
    fn read_peer(&mut self, token: Token) -> Option<String> {
        let chunk = &mut self.scratch;
        let mut frames = Vec::new();
        let mut closed = None;
        {
            let peer = self.peers.get_mut(&token)?;
            loop {
                match peer.stream.read(chunk) {
                    Ok(0) => {
                        closed = Some("connection closed".to_string());
                        break;
                    }
                    Ok(n) => peer.reader.extend(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        closed = Some(e.to_string());
                        break;
                    }
                }
            }
            loop {
                match peer.reader.next_frame() {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => break,
                    Err(e @ DecodeError::FrameTooLarge { .. }) => {
                        closed = Some(e.to_string());
                        break;
                    }
                    Err(e) => log::warn!("[tcp] dropping malformed frame: {}", e),
                }
            }
            if matches!(peer.role, Role::Downstream(_)) {
                // subscribers have nothing to say
                frames.clear();
            }
        }
        for frame in frames {
            if self.matches_filter(&frame.topic) {
                self.inbox.push_back(DataPlaneEvent::Frame(frame));
            } else {
                log::trace!("[tcp] filtered out frame on '{}'", frame.topic);
            }
        }
        closed
    }

    /// Write as much of the peer's backlog as the socket takes.
    fn flush_peer(&mut self, token: Token) -> Option<String> {
        let peer = self.peers.get_mut(&token)?;
        while !peer.outbuf.is_empty() {
            match peer.stream.write(&peer.outbuf) {
                Ok(0) => return Some("write returned zero".into()),
                Ok(n) => {
                    peer.outbuf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(e.to_string()),
            }
        }
        None
    }
}

impl DataPlane for TcpDataPlane {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn register(&mut self, registry: &Registry, base: Token) -> io::Result<()> {
        registry.register(&mut self.listener, base, Interest::READABLE)?;
        self.registry = Some(registry.try_clone()?);
        self.base = base;
        Ok(())
    }

    fn add_filter(&mut self, prefix: &str) {
        if !self.filters.iter().any(|f| f == prefix) {
            self.filters.push(prefix.to_owned());
        }
    }

    fn remove_filter(&mut self, prefix: &str) {
        self.filters.retain(|f| f != prefix);
    }

    fn connect(&mut self, endpoint: &str) -> io::Result<PeerHandle> {
        let addr = parse_endpoint(endpoint)?;
        let stream = TcpStream::connect(addr)?;
        let token = self.add_peer(stream, Role::Upstream(endpoint.to_owned()))?;
        log::debug!("[tcp] connecting to {} ({:?})", endpoint, token);
        Ok(PeerHandle(token.0))
    }

    fn send(&mut self, frame: &Frame) -> io::Result<()> {
        let bytes = frame
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let downstream: Vec<Token> = self
            .peers
            .iter()
            .filter(|(_, p)| matches!(p.role, Role::Downstream(_)))
            .map(|(t, _)| *t)
            .collect();
        for token in downstream {
            let overflow = match self.peers.get_mut(&token) {
                Some(peer) => {
                    peer.outbuf.extend_from_slice(&bytes);
                    peer.outbuf.len() > self.max_backlog
                }
                None => continue,
            };
            if overflow {
                self.close_peer(token, "send backlog overflow");
            } else if let Some(reason) = self.flush_peer(token) {
                self.close_peer(token, &reason);
            }
        }

        if self.matches_filter(&frame.topic) {
            self.inbox.push_back(DataPlaneEvent::Frame(frame.clone()));
        }
        Ok(())
    }

    fn on_ready(&mut self, token: Token, readable: bool, writable: bool) {
        if token == self.base {
            self.accept_all();
            return;
        }
        if writable {
            if let Some(peer) = self.peers.get(&token) {
                if let Ok(Some(e)) = peer.stream.take_error() {
                    self.close_peer(token, &e.to_string());
                    return;
                }
            }
            if let Some(reason) = self.flush_peer(token) {
                self.close_peer(token, &reason);
                return;
            }
        }
        if readable {
            if let Some(reason) = self.read_peer(token) {
                self.close_peer(token, &reason);
            }
        }
    }

    fn has_pending(&self) -> bool {
        !self.inbox.is_empty()
    }

    fn next_event(&mut self) -> Option<DataPlaneEvent> {
        self.inbox.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("tcp://127.0.0.1:4000").expect("parse"),
            "127.0.0.1:4000".parse::<SocketAddr>().expect("addr")
        );
        assert!(parse_endpoint("udp://127.0.0.1:4000").is_err());
        assert!(parse_endpoint("tcp://nohost").is_err());
    }

    #[test]
    fn test_endpoint_has_ephemeral_port() {
        let plane = TcpDataPlane::bind(Ipv4Addr::LOCALHOST, 1024).expect("bind");
        let addr = parse_endpoint(plane.endpoint()).expect("parse");
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_connect_registers_stream_after_listener() {
        let poll = mio::Poll::new().expect("poll");
        let mut plane = TcpDataPlane::bind(Ipv4Addr::LOCALHOST, 1024).expect("bind");
        plane
            .register(poll.registry(), Token(1024))
            .expect("register");
        let endpoint = plane.endpoint().to_owned();
        assert_eq!(plane.connect(&endpoint).expect("connect"), PeerHandle(1025));
        assert_eq!(plane.connect(&endpoint).expect("connect"), PeerHandle(1026));
    }

    #[test]
    fn test_connect_before_register_fails() {
        let mut plane = TcpDataPlane::bind(Ipv4Addr::LOCALHOST, 1024).expect("bind");
        let endpoint = plane.endpoint().to_owned();
        assert!(plane.connect(&endpoint).is_err());
    }

    #[test]
    fn test_local_loopback_respects_filters() {
        let mut plane = TcpDataPlane::bind(Ipv4Addr::LOCALHOST, 1024).expect("bind");
        let guid = crate::identity::NodeGuid::generate();
        plane
            .send(&Frame::publish(guid, "temp", b"21"))
            .expect("send");
        assert!(!plane.has_pending());

        plane.add_filter("te");
        plane.add_filter("te");
        plane
            .send(&Frame::publish(guid, "temp", b"22"))
            .expect("send");
        match plane.next_event() {
            Some(DataPlaneEvent::Frame(f)) => assert_eq!(f.payload, b"22"),
            other => panic!("unexpected {:?}", other),
        }

        plane.remove_filter("te");
        plane
            .send(&Frame::publish(guid, "temp", b"23"))
            .expect("send");
        assert!(plane.next_event().is_none());
    }
}
