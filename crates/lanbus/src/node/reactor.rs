// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-threaded reactor.
//!
//! Each `spin_once` either fires the timer or polls once and services one
//! ready class, in priority order: serial links, discovery, data plane.
//! Readiness is edge-triggered, so a class that is not serviced keeps its
//! ready flag for the next iteration.

use std::io;
use std::time::{Duration, Instant};

use super::{Node, DATA_BASE, DISCOVERY, SERIAL_BASE};
use crate::dataplane::{DataPlaneEvent, Frame};
use crate::discovery::{on_advertise, on_subscribe, AdvertiseAction, SubscribeAction};
use crate::error::{Error, Result};
use crate::registry::SubscribeSlot;
use crate::serial::{LinkEvent, SerialId, SerialRecord};
use crate::wire::{decode_datagram, DiscoveryMessage};

impl Node {
    /// Run one reactor iteration, waiting at most `timeout`.
    ///
    /// Returns `Ok(true)` if the timer fired or an I/O class was
    /// serviced, `Ok(false)` if the wait elapsed with nothing to do.
    pub fn spin_once(&mut self, timeout: Duration) -> Result<bool> {
        self.running_mut()?;
        let now = Instant::now();
        self.tick_links(now);

        let mut wait = timeout;
        if let Some(timer) = &self.timer {
            let due = timer.last_fired + timer.period;
            if due <= now {
                self.fire_timer(now);
                return Ok(true);
            }
            wait = wait.min(due - now);
        }
        if self.has_pending_work() {
            wait = Duration::ZERO;
        }

        self.poll(wait)?;

        let now = Instant::now();
        if self.service_serial(now) {
            return Ok(true);
        }
        if self.service_discovery(now)? {
            return Ok(true);
        }
        Ok(self.service_data_plane(now))
    }

    /// Spin until the [`StopHandle`](super::StopHandle) is triggered or the
    /// reactor fails.
    pub fn spin(&mut self) -> Result<()> {
        self.running_mut()?;
        let interval = self.config.spin_interval;
        while !self.stop.is_stopped() {
            self.spin_once(interval)?;
        }
        self.stop.rearm();
        log::debug!("[node] spin stopped");
        Ok(())
    }

    fn has_pending_work(&self) -> bool {
        let links = self
            .links
            .iter()
            .flatten()
            .any(|slot| slot.ready || slot.link.has_pending());
        let transports = self.running.as_ref().is_some_and(|r| {
            r.discovery_ready || r.discovery.has_pending() || r.data.has_pending()
        });
        links || transports
    }

    fn poll(&mut self, wait: Duration) -> Result<()> {
        let running = self.running_mut()?;
        if let Err(e) = running.poll.poll(&mut running.events, Some(wait)) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            log::error!("[node] poll failed: {}", e);
            return Err(Error::Poll(e));
        }

        let mut serial_ready = Vec::new();
        for event in running.events.iter() {
            let token = event.token();
            if token == DISCOVERY {
                running.discovery_ready = true;
            } else if token.0 >= DATA_BASE.0 {
                running
                    .data
                    .on_ready(token, event.is_readable(), event.is_writable());
            } else {
                serial_ready.push(token.0 - SERIAL_BASE);
            }
        }
        for index in serial_ready {
            if let Some(Some(slot)) = self.links.get_mut(index) {
                slot.ready = true;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------

    fn fire_timer(&mut self, now: Instant) {
        let epoch = self.timer_epoch;
        let Some(mut callback) = self.timer.as_mut().and_then(|timer| {
            timer.last_fired = now;
            timer.callback.take()
        }) else {
            return;
        };
        callback(self);
        // The callback may have replaced or cleared the timer.
        if self.timer_epoch == epoch {
            if let Some(timer) = self.timer.as_mut() {
                timer.callback = Some(callback);
            }
        }
    }

    // ------------------------------------------------------------------
    // Serial
    // ------------------------------------------------------------------

    fn tick_links(&mut self, now: Instant) {
        let mut failed = Vec::new();
        for slot in self.links.iter_mut().flatten() {
            if let Err(e) = slot.link.tick(now) {
                log::error!("[serial:{}] {}", slot.link.name(), e);
                failed.push(slot.link.id());
            }
        }
        for id in failed {
            let _ = self.detach_serial(id);
        }
    }

    fn service_serial(&mut self, now: Instant) -> bool {
        let ready: Vec<SerialId> = self
            .links
            .iter_mut()
            .flatten()
            .filter(|slot| slot.ready || slot.link.has_pending())
            .map(|slot| {
                slot.ready = false;
                slot.link.id()
            })
            .collect();
        if ready.is_empty() {
            return false;
        }

        for id in ready {
            let Some(Some(slot)) = self.links.get_mut(id.index()) else {
                continue;
            };
            match slot.link.service(now) {
                Ok(events) => {
                    for event in events {
                        self.on_link_event(id, event);
                    }
                }
                Err(e) => {
                    log::error!("[serial:{}] {}", slot.link.name(), e);
                    let _ = self.detach_serial(id);
                }
            }
        }
        true
    }

    fn on_link_event(&mut self, id: SerialId, event: LinkEvent) {
        match event {
            LinkEvent::Publish(record) => self.publish_record(record),
            LinkEvent::Subscribe(topic) => {
                match self.subscribe_slot(&topic, SubscribeSlot::Forward(id)) {
                    Ok(()) => log::info!("[serial] {} forwarding '{}'", id, topic),
                    Err(Error::AlreadySubscribed(_)) => {
                        log::debug!("[serial] '{}' already forwarded", topic);
                    }
                    Err(e) => log::warn!("[serial] forward subscribe '{}': {}", topic, e),
                }
            }
        }
    }

    fn publish_record(&mut self, record: SerialRecord) {
        if !self.topics.is_advertised(&record.topic) {
            if let Err(e) = self.advertise(&record.topic) {
                log::warn!("[serial] cannot advertise '{}': {}", record.topic, e);
                if !self.topics.is_advertised(&record.topic) {
                    return;
                }
            }
        }
        let json = record.to_json();
        log::debug!("[serial] publish '{}' {}", record.topic, json);
        if let Err(e) = self.publish(&record.topic, json.as_bytes()) {
            log::warn!("[serial] publish '{}': {}", record.topic, e);
        }
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    fn service_discovery(&mut self, now: Instant) -> Result<bool> {
        let running = self.running_mut()?;
        if !running.discovery_ready && !running.discovery.has_pending() {
            return Ok(false);
        }
        running.discovery_ready = false;

        let mut handled = false;
        loop {
            let running = self.running_mut()?;
            let received = match running.discovery.recv(&mut running.recv_buf) {
                Ok(Some(n)) => decode_datagram(&running.recv_buf[..n]),
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("[discovery] receive failed: {}", e);
                    break;
                }
            };
            handled = true;
            match received {
                Ok(message) => self.on_discovery(message, now),
                Err(e) => log::debug!("[discovery] dropping datagram: {}", e),
            }
        }
        Ok(handled)
    }

    fn on_discovery(&mut self, message: DiscoveryMessage, now: Instant) {
        let Some(local) = self.identity().map(|id| id.guid) else {
            return;
        };
        match message {
            DiscoveryMessage::Advertise(adv) => {
                match on_advertise(local, &adv, &self.connections) {
                    AdvertiseAction::Connect(endpoint) => self.connect_publisher(&endpoint),
                    AdvertiseAction::SelfEcho | AdvertiseAction::AlreadyConnected => {}
                    AdvertiseAction::UnsupportedEndpoint => {
                        log::debug!("[discovery] unsupported endpoint '{}'", adv.address);
                    }
                    AdvertiseAction::VersionMismatch(v) => {
                        log::debug!("[discovery] ADV with version 0x{:04X} ignored", v);
                    }
                }
            }
            DiscoveryMessage::Subscribe(header) => {
                if let SubscribeAction::Readvertise(topic) =
                    on_subscribe(local, &header, &self.topics)
                {
                    let holdoff = self.config.readvertise_holdoff;
                    if self.topics.note_advertised(&topic, now, holdoff) {
                        log::debug!("[discovery] SUB for '{}', re-advertising", topic);
                        if let Err(e) = self.send_advertise(&topic) {
                            log::warn!("[discovery] {}", e);
                        }
                    }
                }
            }
            DiscoveryMessage::Publish(header) => {
                log::debug!("[discovery] PUB datagram for '{}' ignored", header.topic);
            }
        }
    }

    fn connect_publisher(&mut self, endpoint: &str) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        match running.data.connect(endpoint) {
            Ok(handle) => {
                if let Err(e) = self.connections.add(endpoint, handle) {
                    log::warn!("[discovery] {}", e);
                } else {
                    log::info!("[discovery] connected to {}", endpoint);
                }
            }
            Err(e) => log::warn!("[discovery] cannot connect to {}: {}", endpoint, e),
        }
    }

    // ------------------------------------------------------------------
    // Data plane
    // ------------------------------------------------------------------

    fn service_data_plane(&mut self, now: Instant) -> bool {
        let mut handled = false;
        loop {
            let Some(event) = self.running.as_mut().and_then(|r| r.data.next_event()) else {
                break;
            };
            handled = true;
            match event {
                DataPlaneEvent::Frame(frame) => self.dispatch(frame, now),
                DataPlaneEvent::Disconnected(endpoint) => {
                    if self.connections.remove(&endpoint).is_some() {
                        log::info!("[tcp] lost {}", endpoint);
                    }
                }
            }
        }
        handled
    }

    /// Forwarding slot first, then the application handler.
    fn dispatch(&mut self, frame: Frame, now: Instant) {
        let Some(entry) = self.topics.get(&frame.topic) else {
            log::debug!("[node] no subscriber for '{}'", frame.topic);
            return;
        };
        if let Some(id) = entry.forward() {
            if let Some(Some(slot)) = self.links.get_mut(id.index()) {
                if let Err(e) = slot.link.queue_forward(&frame.topic, &frame.payload, now) {
                    log::warn!("[serial:{}] {}", slot.link.name(), e);
                }
            }
        }
        if let Some((_, Some(handler))) = self.topics.dispatch_slots(&frame.topic) {
            handler(&frame.topic, &frame.payload);
        }
    }
}
