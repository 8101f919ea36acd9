// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection registry: one upstream data-plane link per publisher endpoint.

use std::collections::HashMap;
use std::time::Instant;

use crate::dataplane::PeerHandle;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Connection {
    pub endpoint: String,
    pub handle: PeerHandle,
    pub established: Instant,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_endpoint: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, endpoint: &str) -> bool {
        self.by_endpoint.contains_key(endpoint)
    }

    /// Register a link. At most one per endpoint.
    pub fn add(&mut self, endpoint: &str, handle: PeerHandle) -> Result<()> {
        if self.has(endpoint) {
            return Err(Error::InvalidState(format!(
                "already connected to {}",
                endpoint
            )));
        }
        self.by_endpoint.insert(
            endpoint.to_owned(),
            Connection {
                endpoint: endpoint.to_owned(),
                handle,
                established: Instant::now(),
            },
        );
        Ok(())
    }

    /// Forget a link after the transport reported it closed.
    pub fn remove(&mut self, endpoint: &str) -> Option<Connection> {
        self.by_endpoint.remove(endpoint)
    }

    pub fn get(&self, endpoint: &str) -> Option<&Connection> {
        self.by_endpoint.get(endpoint)
    }

    pub fn len(&self) -> usize {
        self.by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_endpoint.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.by_endpoint.values()
    }
}
