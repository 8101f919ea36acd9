// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory transports for driving a `Node` without sockets.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use lanbus::dataplane::{DataPlane, DataPlaneEvent, Frame, PeerHandle};
use lanbus::discovery::DiscoverySocket;
use lanbus::serial::SerialIo;
use lanbus::wire::{decode_datagram, DiscoveryMessage};
use lanbus::{Node, NodeConfig};
use mio::{Registry, Token};

// ----------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct DiscoveryState {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct FakeDiscovery(pub Rc<RefCell<DiscoveryState>>);

impl FakeDiscovery {
    pub fn inject(&self, datagram: Vec<u8>) {
        self.0.borrow_mut().inbound.push_back(datagram);
    }

    /// Decoded datagrams sent since the last call.
    pub fn take_sent(&self) -> Vec<DiscoveryMessage> {
        std::mem::take(&mut self.0.borrow_mut().sent)
            .iter()
            .map(|d| decode_datagram(d).expect("node sent a malformed datagram"))
            .collect()
    }
}

impl DiscoverySocket for FakeDiscovery {
    fn register(&mut self, _registry: &Registry, _token: Token) -> io::Result<()> {
        Ok(())
    }

    fn broadcast(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.0.borrow_mut().sent.push(datagram.to_vec());
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Some(datagram) = self.0.borrow_mut().inbound.pop_front() else {
            return Ok(None);
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(Some(n))
    }

    fn has_pending(&self) -> bool {
        !self.0.borrow().inbound.is_empty()
    }
}

// ----------------------------------------------------------------------
// Data plane
// ----------------------------------------------------------------------

pub const FAKE_ENDPOINT: &str = "tcp://127.0.0.1:40000";

#[derive(Default)]
pub struct DataState {
    pub filters: Vec<String>,
    pub sent: Vec<Frame>,
    pub connects: Vec<String>,
    pub inbox: VecDeque<DataPlaneEvent>,
    pub refuse_connect: bool,
}

#[derive(Clone, Default)]
pub struct FakeDataPlane(pub Rc<RefCell<DataState>>);

impl FakeDataPlane {
    pub fn deliver(&self, frame: Frame) {
        self.0
            .borrow_mut()
            .inbox
            .push_back(DataPlaneEvent::Frame(frame));
    }

    pub fn disconnect(&self, endpoint: &str) {
        self.0
            .borrow_mut()
            .inbox
            .push_back(DataPlaneEvent::Disconnected(endpoint.to_owned()));
    }

    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut self.0.borrow_mut().sent)
    }

    pub fn filters(&self) -> Vec<String> {
        self.0.borrow().filters.clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.0.borrow().connects.clone()
    }
}

impl DataPlane for FakeDataPlane {
    fn endpoint(&self) -> &str {
        FAKE_ENDPOINT
    }

    fn register(&mut self, _registry: &Registry, _base: Token) -> io::Result<()> {
        Ok(())
    }

    fn add_filter(&mut self, prefix: &str) {
        self.0.borrow_mut().filters.push(prefix.to_owned());
    }

    fn remove_filter(&mut self, prefix: &str) {
        self.0.borrow_mut().filters.retain(|f| f != prefix);
    }

    fn connect(&mut self, endpoint: &str) -> io::Result<PeerHandle> {
        let mut state = self.0.borrow_mut();
        if state.refuse_connect {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        state.connects.push(endpoint.to_owned());
        Ok(PeerHandle(state.connects.len()))
    }

    fn send(&mut self, frame: &Frame) -> io::Result<()> {
        self.0.borrow_mut().sent.push(frame.clone());
        Ok(())
    }

    fn on_ready(&mut self, _token: Token, _readable: bool, _writable: bool) {}

    fn has_pending(&self) -> bool {
        !self.0.borrow().inbox.is_empty()
    }

    fn next_event(&mut self) -> Option<DataPlaneEvent> {
        self.0.borrow_mut().inbox.pop_front()
    }
}

// ----------------------------------------------------------------------
// Serial
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct SerialState {
    pub to_node: VecDeque<u8>,
    pub from_node: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct FakeSerial(pub Rc<RefCell<SerialState>>);

impl FakeSerial {
    pub fn peer_sends(&self, bytes: &[u8]) {
        self.0.borrow_mut().to_node.extend(bytes.iter().copied());
    }

    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().from_node)
    }
}

impl Read for FakeSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        if state.to_node.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let mut n = 0;
        while n < buf.len() {
            match state.to_node.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for FakeSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().from_node.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialIo for FakeSerial {
    fn has_pending(&self) -> bool {
        !self.0.borrow().to_node.is_empty()
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

pub struct Harness {
    pub node: Node,
    pub discovery: FakeDiscovery,
    pub data: FakeDataPlane,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(NodeConfig::default())
    }

    pub fn with_config(config: NodeConfig) -> Self {
        let discovery = FakeDiscovery::default();
        let data = FakeDataPlane::default();
        let mut node = Node::new(config);
        node.init_with(Box::new(discovery.clone()), Box::new(data.clone()))
            .expect("init with fakes");
        Self {
            node,
            discovery,
            data,
        }
    }

    /// Spin until an iteration finds nothing to do.
    pub fn settle(&mut self) {
        for _ in 0..32 {
            if !self.node.spin_once(Duration::ZERO).expect("spin_once") {
                return;
            }
        }
        panic!("node never went idle");
    }
}
