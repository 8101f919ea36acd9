// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The bus node: one owned context holding the registries, the transports,
//! the serial links and the timer.
//!
//! # Example
//!
//! ```no_run
//! use lanbus::{Node, NodeConfig};
//!
//! # fn main() -> lanbus::Result<()> {
//! let mut node = Node::new(NodeConfig::from_env());
//! node.init()?;
//! node.subscribe("lights", |topic, payload| {
//!     println!("{}: {}", topic, String::from_utf8_lossy(payload));
//! })?;
//! node.advertise("switches")?;
//! node.publish("switches", br#"{"on":true}"#)?;
//! node.spin()?;
//! # Ok(())
//! # }
//! ```

mod reactor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};

use crate::config::NodeConfig;
use crate::dataplane::{DataPlane, Frame, TcpDataPlane};
use crate::discovery::{broadcast_address, local_ipv4, DiscoverySocket, UdpDiscovery};
use crate::error::{Error, Result};
use crate::identity::{NodeGuid, NodeIdentity};
use crate::registry::{ConnectionRegistry, SubscribeOutcome, SubscribeSlot, TopicRegistry};
use crate::serial::{LinkStats, SerialId, SerialIo, SerialLink};
use crate::wire::{encode_subscribe, topic_hash_name, AdvertiseMessage};

const DISCOVERY: Token = Token(0);
const SERIAL_BASE: usize = 1;
const DATA_BASE: Token = Token(1024);
const MAX_SERIAL_LINKS: usize = DATA_BASE.0 - SERIAL_BASE;
const MAX_EVENTS: usize = 64;

/// Timer callback; runs on the reactor thread with full access to the node.
pub type TimerCallback = Box<dyn FnMut(&mut Node)>;

/// Stops [`Node::spin`] from another thread or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn rearm(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

struct Timer {
    callback: Option<TimerCallback>,
    period: Duration,
    last_fired: Instant,
}

struct LinkSlot {
    link: SerialLink,
    ready: bool,
    registered: bool,
}

/// State that exists only after `init`.
struct Running {
    poll: Poll,
    events: Events,
    identity: NodeIdentity,
    discovery: Box<dyn DiscoverySocket>,
    data: Box<dyn DataPlane>,
    discovery_ready: bool,
    recv_buf: Vec<u8>,
}

pub struct Node {
    config: NodeConfig,
    running: Option<Running>,
    topics: TopicRegistry,
    connections: ConnectionRegistry,
    links: Vec<Option<LinkSlot>>,
    timer: Option<Timer>,
    timer_epoch: u64,
    stop: StopHandle,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            running: None,
            topics: TopicRegistry::new(),
            connections: ConnectionRegistry::new(),
            links: Vec::new(),
            timer: None,
            timer_epoch: 0,
            stop: StopHandle::default(),
        }
    }

    /// Bind the UDP discovery socket and the TCP data plane.
    pub fn init(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::InvalidState("node already initialized".into()));
        }
        self.config.validate()?;

        let ipv4 = local_ipv4(self.config.interface)
            .map_err(|e| Error::Transport(format!("local address lookup failed: {}", e)))?;
        let broadcast = self
            .config
            .broadcast
            .unwrap_or_else(|| broadcast_address(ipv4));

        let discovery = UdpDiscovery::bind(self.config.discovery_port, broadcast).map_err(|e| {
            Error::Transport(format!(
                "cannot bind discovery port {}: {}",
                self.config.discovery_port, e
            ))
        })?;
        let data = TcpDataPlane::bind(ipv4, self.config.max_frame_size)
            .map_err(|e| Error::Transport(format!("cannot bind data plane on {}: {}", ipv4, e)))?;

        self.start(ipv4, broadcast, Box::new(discovery), Box::new(data))
    }

    /// Initialise over caller-supplied transports.
    ///
    /// The announced IPv4 and broadcast addresses come from the config
    /// overrides, defaulting to loopback.
    pub fn init_with(
        &mut self,
        discovery: Box<dyn DiscoverySocket>,
        data: Box<dyn DataPlane>,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::InvalidState("node already initialized".into()));
        }
        self.config.validate()?;
        let ipv4 = self.config.interface.unwrap_or(std::net::Ipv4Addr::LOCALHOST);
        let broadcast = self
            .config
            .broadcast
            .unwrap_or_else(|| broadcast_address(ipv4));
        self.start(ipv4, broadcast, discovery, data)
    }

    fn start(
        &mut self,
        ipv4: std::net::Ipv4Addr,
        broadcast: std::net::Ipv4Addr,
        mut discovery: Box<dyn DiscoverySocket>,
        mut data: Box<dyn DataPlane>,
    ) -> Result<()> {
        let poll = Poll::new().map_err(Error::Poll)?;
        discovery
            .register(poll.registry(), DISCOVERY)
            .map_err(|e| Error::Transport(format!("discovery registration failed: {}", e)))?;
        data.register(poll.registry(), DATA_BASE)
            .map_err(|e| Error::Transport(format!("data plane registration failed: {}", e)))?;

        let identity = NodeIdentity {
            guid: NodeGuid::generate(),
            ipv4,
            broadcast,
            endpoint: data.endpoint().to_owned(),
        };
        log::info!(
            "[node] started guid={} ip={} broadcast={} endpoint={}",
            identity.guid,
            identity.ipv4,
            identity.broadcast,
            identity.endpoint
        );

        self.running = Some(Running {
            poll,
            events: Events::with_capacity(MAX_EVENTS),
            identity,
            discovery,
            data,
            discovery_ready: true,
            recv_buf: vec![0u8; self.config.max_datagram_size],
        });
        Ok(())
    }

    fn running_mut(&mut self) -> Result<&mut Running> {
        self.running.as_mut().ok_or(Error::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.running.is_some()
    }

    pub fn identity(&self) -> Option<&NodeIdentity> {
        self.running.as_ref().map(|r| &r.identity)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // ------------------------------------------------------------------
    // Topics
    // ------------------------------------------------------------------

    /// Claim `topic` for publishing and announce it.
    pub fn advertise(&mut self, topic: &str) -> Result<()> {
        self.running_mut()?;
        self.topics.advertise(topic)?;
        self.topics
            .note_advertised(topic, Instant::now(), Duration::ZERO);
        log::debug!("[node] advertise '{}'", topic);
        self.send_advertise(topic)
    }

    pub fn advertise_hash(&mut self, topic: &str) -> Result<()> {
        self.advertise(&topic_hash_name(topic))
    }

    pub fn is_advertised(&self, topic: &str) -> bool {
        self.topics.is_advertised(topic)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.is_subscribed(topic)
    }

    /// Deliver every message on `topic` to `handler`.
    pub fn subscribe<F>(&mut self, topic: &str, handler: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]) + 'static,
    {
        self.subscribe_slot(topic, SubscribeSlot::Handler(Box::new(handler)))
    }

    pub fn subscribe_hash<F>(&mut self, topic: &str, handler: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]) + 'static,
    {
        self.subscribe(&topic_hash_name(topic), handler)
    }

    fn subscribe_slot(&mut self, topic: &str, slot: SubscribeSlot) -> Result<()> {
        self.running_mut()?;
        match self.topics.subscribe(topic, slot)? {
            SubscribeOutcome::NewlySubscribed => {
                log::debug!("[node] subscribe '{}'", topic);
                let running = self.running_mut()?;
                running.data.add_filter(topic);
                let datagram = encode_subscribe(running.identity.guid, topic)?;
                running.discovery.broadcast(&datagram).map_err(|e| {
                    Error::Transport(format!("SUB broadcast for '{}' failed: {}", topic, e))
                })
            }
            SubscribeOutcome::SlotFilled => Ok(()),
        }
    }

    /// Remove the application handler of `topic`. The data-plane filter is
    /// dropped once no serial link forwards the topic either.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.running_mut()?;
        if !self.topics.unsubscribe(topic)? {
            self.running_mut()?.data.remove_filter(topic);
        }
        Ok(())
    }

    /// Send `payload` to every subscriber of `topic`.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.running_mut()?;
        if !self.topics.is_advertised(topic) {
            return Err(Error::NotAdvertised(topic.to_owned()));
        }
        let running = self.running_mut()?;
        let frame = Frame::publish(running.identity.guid, topic, payload);
        running
            .data
            .send(&frame)
            .map_err(|e| Error::Transport(format!("publish on '{}' failed: {}", topic, e)))
    }

    pub fn publish_hash(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.publish(&topic_hash_name(topic), payload)
    }

    fn send_advertise(&mut self, topic: &str) -> Result<()> {
        let running = self.running_mut()?;
        let datagram =
            AdvertiseMessage::new(running.identity.guid, topic, &running.identity.endpoint)
                .to_bytes()?;
        running.discovery.broadcast(&datagram).map_err(|e| {
            Error::Transport(format!("ADV broadcast for '{}' failed: {}", topic, e))
        })
    }

    // ------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------

    /// Install the single periodic timer, replacing any previous one.
    pub fn set_timer<F>(&mut self, period: Duration, callback: F) -> Result<()>
    where
        F: FnMut(&mut Node) + 'static,
    {
        self.running_mut()?;
        if period.is_zero() {
            return Err(Error::InvalidArgument("timer period must be non-zero".into()));
        }
        self.timer_epoch += 1;
        self.timer = Some(Timer {
            callback: Some(Box::new(callback)),
            period,
            last_fired: Instant::now(),
        });
        Ok(())
    }

    pub fn clear_timer(&mut self) {
        self.timer_epoch += 1;
        self.timer = None;
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    // ------------------------------------------------------------------
    // Serial links
    // ------------------------------------------------------------------

    /// Open, reset and attach a tty peer.
    #[cfg(unix)]
    pub fn open_serial(&mut self, path: &str) -> Result<SerialId> {
        self.running_mut()?;
        let port = crate::serial::SerialPort::open(path, self.config.serial_baud)
            .map_err(|e| Error::Transport(format!("cannot open {}: {}", path, e)))?;
        port.reset(self.config.serial_settle)
            .map_err(|e| Error::Transport(format!("cannot reset {}: {}", path, e)))?;
        log::info!(
            "[serial] {} ready at {} baud",
            path,
            self.config.serial_baud
        );
        self.attach_serial(path, Box::new(port))
    }

    /// Attach any serial byte stream and greet the peer with an ACK.
    pub fn attach_serial(&mut self, name: &str, io: Box<dyn SerialIo>) -> Result<SerialId> {
        self.running_mut()?;
        let index = match self.links.iter().position(Option::is_none) {
            Some(index) => index,
            None if self.links.len() < MAX_SERIAL_LINKS => {
                self.links.push(None);
                self.links.len() - 1
            }
            None => {
                return Err(Error::InvalidState(format!(
                    "at most {} serial links",
                    MAX_SERIAL_LINKS
                )))
            }
        };
        let id = SerialId::new(index);
        let mut link = SerialLink::new(
            id,
            name,
            io,
            self.config.serial_message_timeout,
            self.config.serial_write_timeout,
        )
        .with_forward_capacity(self.config.serial_forward_queue);

        let registered = register_link(self.running_mut()?, &link, true)?;
        if let Err(e) = link.send_ack() {
            if registered {
                let _ = register_link(self.running_mut()?, &link, false);
            }
            return Err(e);
        }
        self.links[index] = Some(LinkSlot {
            link,
            ready: true,
            registered,
        });
        log::debug!("[serial] attached {} as {}", name, id);
        Ok(id)
    }

    /// Detach a link and drop the forwarding subscriptions pointing at it.
    pub fn detach_serial(&mut self, id: SerialId) -> Result<()> {
        let slot = self
            .links
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(Error::UnknownSerialLink(id.index()))?;
        if slot.registered {
            if let Some(running) = self.running.as_mut() {
                let _ = register_link(running, &slot.link, false);
            }
        }
        for topic in self.topics.clear_forwards(id) {
            if let Some(running) = self.running.as_mut() {
                running.data.remove_filter(&topic);
            }
        }
        log::info!("[serial] detached {}", slot.link.name());
        Ok(())
    }

    pub fn serial_stats(&self, id: SerialId) -> Option<&LinkStats> {
        self.links
            .get(id.index())
            .and_then(Option::as_ref)
            .map(|slot| slot.link.stats())
    }

    pub fn serial_links(&self) -> impl Iterator<Item = SerialId> + '_ {
        self.links
            .iter()
            .flatten()
            .map(|slot| slot.link.id())
    }
}

/// Register (or deregister) the link's descriptor, if it has one.
#[cfg(unix)]
fn register_link(running: &mut Running, link: &SerialLink, attach: bool) -> Result<bool> {
    use mio::unix::SourceFd;

    let Some(fd) = link.io().raw_fd() else {
        return Ok(false);
    };
    let registry = running.poll.registry();
    let result = if attach {
        registry.register(
            &mut SourceFd(&fd),
            Token(SERIAL_BASE + link.id().index()),
            Interest::READABLE,
        )
    } else {
        registry.deregister(&mut SourceFd(&fd))
    };
    result.map_err(|e| Error::Transport(format!("serial {} registration: {}", link.name(), e)))?;
    Ok(true)
}

#[cfg(not(unix))]
fn register_link(_running: &mut Running, _link: &SerialLink, _attach: bool) -> Result<bool> {
    Ok(false)
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.identity())
            .field("topics", &self.topics.len())
            .field("connections", &self.connections.len())
            .field("serial_links", &self.links.iter().flatten().count())
            .field("timer", &self.timer.as_ref().map(|t| t.period))
            .finish()
    }
}
