// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-node bookkeeping: topics and data-plane connections.

pub mod connections;
pub mod topics;

pub use connections::{Connection, ConnectionRegistry};
pub use topics::{
    MessageHandler, SubscribeOutcome, SubscribeSlot, TopicEntry, TopicId, TopicRegistry,
};
