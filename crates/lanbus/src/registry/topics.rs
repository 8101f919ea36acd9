// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic registry: advertised/subscribed state and per-topic handlers.
//!
//! Entries live in an arena and are never removed while the node runs;
//! a name index gives O(1) lookup. Each entry has two independent
//! subscription slots: the application handler and a forwarding target
//! (a serial link relaying bus messages to its peer).

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::serial::SerialId;
use crate::wire::validate_topic;

/// Application callback invoked with `(topic, payload)`.
pub type MessageHandler = Box<dyn FnMut(&str, &[u8])>;

/// Stable index of a topic in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicId(usize);

/// Which subscription slot a `subscribe` call fills.
pub enum SubscribeSlot {
    Handler(MessageHandler),
    Forward(SerialId),
}

impl fmt::Debug for SubscribeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeSlot::Handler(_) => f.write_str("Handler(..)"),
            SubscribeSlot::Forward(id) => write!(f, "Forward({:?})", id),
        }
    }
}

/// Result of a successful `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The topic had no subscription before; the caller installs the
    /// data-plane filter and announces a SUB.
    NewlySubscribed,
    /// The other slot was already set; only the missing slot was filled.
    SlotFilled,
}

pub struct TopicEntry {
    name: String,
    advertised: bool,
    handler: Option<MessageHandler>,
    forward: Option<SerialId>,
    last_advertised: Option<Instant>,
}

impl TopicEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            advertised: false,
            handler: None,
            forward: None,
            last_advertised: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_advertised(&self) -> bool {
        self.advertised
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler.is_some() || self.forward.is_some()
    }

    pub fn forward(&self) -> Option<SerialId> {
        self.forward
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for TopicEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicEntry")
            .field("name", &self.name)
            .field("advertised", &self.advertised)
            .field("handler", &self.handler.is_some())
            .field("forward", &self.forward)
            .finish()
    }
}

#[derive(Default)]
pub struct TopicRegistry {
    entries: Vec<TopicEntry>,
    index: HashMap<String, TopicId>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<TopicId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&TopicEntry> {
        self.lookup(name).map(|id| &self.entries[id.0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicEntry> {
        self.entries.iter()
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut TopicEntry> {
        validate_topic(name)?;
        let id = match self.index.get(name) {
            Some(id) => *id,
            None => {
                let id = TopicId(self.entries.len());
                self.entries.push(TopicEntry::new(name));
                self.index.insert(name.to_owned(), id);
                id
            }
        };
        Ok(&mut self.entries[id.0])
    }

    /// Claim `name` for publishing. Fails if this node already did.
    pub fn advertise(&mut self, name: &str) -> Result<()> {
        let entry = self.entry_mut(name)?;
        if entry.advertised {
            return Err(Error::AlreadyAdvertised(name.to_owned()));
        }
        entry.advertised = true;
        Ok(())
    }

    pub fn is_advertised(&self, name: &str) -> bool {
        self.get(name).is_some_and(TopicEntry::is_advertised)
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.get(name).is_some_and(TopicEntry::is_subscribed)
    }

    /// Fill one subscription slot. A slot that is already set is an error;
    /// the other slot is left untouched.
    pub fn subscribe(&mut self, name: &str, slot: SubscribeSlot) -> Result<SubscribeOutcome> {
        let entry = self.entry_mut(name)?;
        let was_subscribed = entry.is_subscribed();
        match slot {
            SubscribeSlot::Handler(handler) => {
                if entry.handler.is_some() {
                    return Err(Error::AlreadySubscribed(name.to_owned()));
                }
                entry.handler = Some(handler);
            }
            SubscribeSlot::Forward(serial) => {
                if entry.forward.is_some() {
                    return Err(Error::AlreadySubscribed(name.to_owned()));
                }
                entry.forward = Some(serial);
            }
        }
        Ok(if was_subscribed {
            SubscribeOutcome::SlotFilled
        } else {
            SubscribeOutcome::NewlySubscribed
        })
    }

    /// Drop the application handler. Returns whether the topic is still
    /// subscribed through its forwarding slot.
    pub fn unsubscribe(&mut self, name: &str) -> Result<bool> {
        let id = self
            .lookup(name)
            .ok_or_else(|| Error::NotSubscribed(name.to_owned()))?;
        let entry = &mut self.entries[id.0];
        if entry.handler.take().is_none() {
            return Err(Error::NotSubscribed(name.to_owned()));
        }
        Ok(entry.is_subscribed())
    }

    /// Clear every forwarding slot pointing at `serial`. Returns the names
    /// of topics left with no subscription at all.
    pub fn clear_forwards(&mut self, serial: SerialId) -> Vec<String> {
        let mut orphaned = Vec::new();
        for entry in &mut self.entries {
            if entry.forward == Some(serial) {
                entry.forward = None;
                if !entry.is_subscribed() {
                    orphaned.push(entry.name.clone());
                }
            }
        }
        orphaned
    }

    /// Forwarding target and mutable handler of `name`, for dispatch.
    pub fn dispatch_slots(
        &mut self,
        name: &str,
    ) -> Option<(Option<SerialId>, Option<&mut MessageHandler>)> {
        let id = self.lookup(name)?;
        let entry = &mut self.entries[id.0];
        Some((entry.forward, entry.handler.as_mut()))
    }

    /// Record an (re-)advertisement of `name` at `now`, unless the last one
    /// was less than `holdoff` ago. Returns whether the caller should send.
    pub fn note_advertised(&mut self, name: &str, now: Instant, holdoff: Duration) -> bool {
        let Some(id) = self.lookup(name) else {
            return false;
        };
        let entry = &mut self.entries[id.0];
        if !holdoff.is_zero() {
            if let Some(last) = entry.last_advertised {
                if now.saturating_duration_since(last) < holdoff {
                    return false;
                }
            }
        }
        entry.last_advertised = Some(now);
        true
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
