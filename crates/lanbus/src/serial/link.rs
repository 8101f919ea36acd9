// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One attached serial peer: inbound decoding, ACKs and the forward
//! handshake.
//!
//! ```text
//!  peer                          bridge
//!   | -- tagged values, 0xFF --> |   publish record
//!   | <--------- 'A' ----------- |
//!   |                            |   bus message on a forwarded topic
//!   | <--------- 'D' ----------- |
//!   | ---------- 'R' ----------> |
//!   | <-- code, fields, 0xFF --- |
//!   | <--------- 'A' ----------- |
//! ```
//!
//! While the bridge waits for `'R'` the peer may start a message of its
//! own (first byte 0x00 or 0x01); such nested messages are not ACKed.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::codec::{ACK, READY, REQUEST, TAG_HASH, TAG_STRING};
use super::decoder::{SerialDecoder, SerialToken};
use super::record::{encode_forward, RecordBuilder, SerialRecord};
use super::{SerialId, SerialIo};
use crate::error::{Error, Result};
use crate::wire::crc::hash_name;

const READ_CHUNK: usize = 256;
const MAX_CONSOLE_LINE: usize = 256;

/// Forwards kept per link unless `with_forward_capacity` says otherwise.
pub const DEFAULT_FORWARD_CAPACITY: usize = 32;

/// Something the node has to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A complete record from the peer.
    Publish(SerialRecord),
    /// The peer asked for messages on this hash topic.
    Subscribe(String),
}

/// Link counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkStats {
    pub bytes_received: u64,
    pub records: u64,
    pub integrity_errors: u64,
    pub forwards: u64,
    /// Forwards discarded because the queue was full.
    pub forwards_dropped: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Copy)]
struct OpenMessage {
    nested: bool,
    last_byte: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardState {
    Idle,
    AwaitingRequest { since: Instant },
}

pub struct SerialLink {
    id: SerialId,
    name: String,
    io: Box<dyn SerialIo>,
    decoder: SerialDecoder,
    record: RecordBuilder,
    message: Option<OpenMessage>,
    forward: ForwardState,
    queue: VecDeque<Vec<u8>>,
    forward_capacity: usize,
    outbuf: Vec<u8>,
    out_since: Option<Instant>,
    console: String,
    stats: LinkStats,
    message_timeout: Duration,
    write_timeout: Duration,
}

impl SerialLink {
    pub fn new(
        id: SerialId,
        name: impl Into<String>,
        io: Box<dyn SerialIo>,
        message_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            io,
            decoder: SerialDecoder::new(),
            record: RecordBuilder::new(),
            message: None,
            forward: ForwardState::Idle,
            queue: VecDeque::new(),
            forward_capacity: DEFAULT_FORWARD_CAPACITY,
            outbuf: Vec::new(),
            out_since: None,
            console: String::new(),
            stats: LinkStats::default(),
            message_timeout,
            write_timeout,
        }
    }

    /// Bound the forward queue; the oldest unannounced entry is dropped
    /// when a new one arrives on a full queue. Clamped to at least 1.
    pub fn with_forward_capacity(mut self, capacity: usize) -> Self {
        self.forward_capacity = capacity.max(1);
        self
    }

    pub fn id(&self) -> SerialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn io(&self) -> &dyn SerialIo {
        self.io.as_ref()
    }

    /// Bytes waiting without a readiness event (in-memory ports).
    pub fn has_pending(&self) -> bool {
        self.io.has_pending()
    }

    /// Forwards queued or in flight.
    pub fn forwards_pending(&self) -> usize {
        self.queue.len()
    }

    /// Write a bare ACK (sent once when the link comes up).
    pub fn send_ack(&mut self) -> Result<()> {
        self.write(&[ACK])
    }

    /// Queue a bus message for the peer. Payloads that are not JSON
    /// objects are skipped.
    pub fn queue_forward(&mut self, topic: &str, payload: &[u8], now: Instant) -> Result<bool> {
        let Some(bytes) = encode_forward(topic, payload) else {
            log::debug!(
                "[serial:{}] '{}' payload is not a JSON object, not forwarded",
                self.name,
                topic
            );
            return Ok(false);
        };
        if self.queue.len() >= self.forward_capacity {
            // the head is already announced while a request is awaited
            let oldest = usize::from(self.forward != ForwardState::Idle);
            self.stats.forwards_dropped += 1;
            if self.queue.remove(oldest).is_none() {
                log::warn!(
                    "[serial:{}] forward queue full, '{}' dropped",
                    self.name,
                    topic
                );
                return Ok(false);
            }
            log::warn!(
                "[serial:{}] forward queue full ({}), oldest entry dropped",
                self.name,
                self.forward_capacity
            );
        }
        self.queue.push_back(bytes);
        self.pump(now)?;
        Ok(true)
    }

    /// Read whatever the port has and run it through the decoder.
    pub fn service(&mut self, now: Instant) -> Result<Vec<LinkEvent>> {
        let mut events = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.io.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.stats.bytes_received += n as u64;
                    for &byte in &chunk[..n] {
                        self.on_byte(byte, now, &mut events)?;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::Transport(format!(
                        "serial {} read failed: {}",
                        self.name, e
                    )))
                }
            }
        }
        self.pump(now)?;
        Ok(events)
    }

    /// Timeouts, pending 'D' and output flushing.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        if let Some(msg) = self.message {
            if now.saturating_duration_since(msg.last_byte) > self.message_timeout {
                log::warn!(
                    "[serial:{}] message silent for {:?}, abandoned",
                    self.name,
                    self.message_timeout
                );
                self.stats.timeouts += 1;
                self.decoder.reset();
                self.record.reset();
                self.message = None;
            }
        }
        if let ForwardState::AwaitingRequest { since } = self.forward {
            if self.message.is_none()
                && now.saturating_duration_since(since) > self.message_timeout
            {
                log::warn!("[serial:{}] peer never requested forward, dropped", self.name);
                self.stats.timeouts += 1;
                self.queue.pop_front();
                self.forward = ForwardState::Idle;
            }
        }
        if let Some(since) = self.out_since {
            if now.saturating_duration_since(since) > self.write_timeout {
                log::warn!(
                    "[serial:{}] dropping {} unsent bytes",
                    self.name,
                    self.outbuf.len()
                );
                self.outbuf.clear();
                self.out_since = None;
            }
        }
        self.pump(now)
    }

    fn on_byte(&mut self, byte: u8, now: Instant, events: &mut Vec<LinkEvent>) -> Result<()> {
        if self.message.is_none() {
            let nested = match self.forward {
                ForwardState::AwaitingRequest { .. } => match byte {
                    REQUEST => return self.send_forward(),
                    TAG_STRING | TAG_HASH => true,
                    _ => {
                        log::trace!(
                            "[serial:{}] ignoring 0x{:02X} while awaiting request",
                            self.name,
                            byte
                        );
                        return Ok(());
                    }
                },
                ForwardState::Idle => false,
            };
            self.message = Some(OpenMessage {
                nested,
                last_byte: now,
            });
        }
        if let Some(msg) = self.message.as_mut() {
            msg.last_byte = now;
        }

        match self.decoder.feed(byte) {
            Ok(Some(token)) => self.on_token(token, events),
            Ok(None) => Ok(()),
            Err(e) => {
                log::warn!("[serial:{}] {}; record discarded", self.name, e);
                self.stats.integrity_errors += 1;
                self.record.poison();
                Ok(())
            }
        }
    }

    fn on_token(&mut self, token: SerialToken, events: &mut Vec<LinkEvent>) -> Result<()> {
        match token {
            SerialToken::Console(text) => self.console(&text),
            SerialToken::Subscribers(codes) => {
                events.extend(codes.into_iter().map(|c| LinkEvent::Subscribe(hash_name(c))));
            }
            SerialToken::End => {
                let nested = self.message.take().is_some_and(|m| m.nested);
                if let Some(record) = self.record.apply(SerialToken::End) {
                    self.stats.records += 1;
                    events.push(LinkEvent::Publish(record));
                }
                if !nested {
                    self.write(&[ACK])?;
                }
            }
            other => {
                self.record.apply(other);
            }
        }
        Ok(())
    }

    fn console(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' || self.console.len() >= MAX_CONSOLE_LINE {
                log::info!("[serial:{}] {}", self.name, self.console.trim_end());
                self.console.clear();
            }
            if ch != '\n' && ch != '\r' {
                self.console.push(ch);
            }
        }
    }

    fn send_forward(&mut self) -> Result<()> {
        self.forward = ForwardState::Idle;
        if let Some(bytes) = self.queue.pop_front() {
            self.stats.forwards += 1;
            self.write(&bytes)?;
            self.write(&[ACK])?;
        }
        Ok(())
    }

    /// Announce the next queued forward when the line is quiet.
    fn pump(&mut self, now: Instant) -> Result<()> {
        if self.message.is_none()
            && self.forward == ForwardState::Idle
            && !self.queue.is_empty()
        {
            self.forward = ForwardState::AwaitingRequest { since: now };
            self.write(&[READY])?;
        }
        self.flush()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.outbuf.is_empty() {
            self.out_since = Some(Instant::now());
        }
        self.outbuf.extend_from_slice(bytes);
        self.flush()
    }

    /// Push buffered output to the port; leftovers wait for the next call.
    pub fn flush(&mut self) -> Result<()> {
        while !self.outbuf.is_empty() {
            match self.io.write(&self.outbuf) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbuf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::Transport(format!(
                        "serial {} write failed: {}",
                        self.name, e
                    )))
                }
            }
        }
        if self.outbuf.is_empty() {
            self.out_since = None;
            let _ = self.io.flush();
        }
        Ok(())
    }
}
