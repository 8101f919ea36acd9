// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Serial peer bridged onto a node over fake transports.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{FakeSerial, Harness};
use lanbus::dataplane::Frame;
use lanbus::serial::codec::{SerialEncoder, ACK, READY, REQUEST};
use lanbus::wire::DiscoveryMessage;
use lanbus::{topic_hash, topic_hash_name, NodeGuid, SerialId};

fn attach(h: &mut Harness) -> (SerialId, FakeSerial) {
    let serial = FakeSerial::default();
    let id = h
        .node
        .attach_serial("fake-mcu", Box::new(serial.clone()))
        .expect("attach");
    assert_eq!(serial.take_output(), vec![ACK], "greeting ACK");
    (id, serial)
}

fn message(topic: &str, key: &str, value: i32) -> Vec<u8> {
    let mut enc = SerialEncoder::new();
    enc.string(topic).string(key).int32(value).end();
    enc.into_bytes()
}

#[test]
fn test_record_is_advertised_and_published() {
    let mut h = Harness::new();
    let (_, serial) = attach(&mut h);

    serial.peer_sends(&message("T", "k", 42));
    h.settle();

    assert!(h.node.is_advertised("T"));
    let sent = h.discovery.take_sent();
    assert!(matches!(&sent[..], [DiscoveryMessage::Advertise(a)] if a.header.topic == "T"));

    let frames = h.data.take_sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].topic, "T");
    assert_eq!(frames[0].payload, br#"{"k":42}"#);
    assert_eq!(serial.take_output(), vec![ACK]);
}

#[test]
fn test_repeat_record_does_not_readvertise() {
    let mut h = Harness::new();
    let (_, serial) = attach(&mut h);
    serial.peer_sends(&message("T", "k", 1));
    serial.peer_sends(&message("T", "k", 2));
    h.settle();

    assert_eq!(h.discovery.take_sent().len(), 1);
    assert_eq!(h.data.take_sent().len(), 2);
    assert_eq!(serial.take_output(), vec![ACK, ACK]);
}

#[test]
fn test_crc_error_drops_record_then_recovers() {
    let mut h = Harness::new();
    let (id, serial) = attach(&mut h);

    let mut corrupt = message("T", "k", 42);
    let crc_at = corrupt.len() - 1 - 4 - 2;
    corrupt[crc_at] ^= 0x01;
    serial.peer_sends(&corrupt);
    serial.peer_sends(&message("T", "k", 7));
    h.settle();

    let frames = h.data.take_sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, br#"{"k":7}"#);
    assert_eq!(
        h.node.serial_stats(id).map(|s| s.integrity_errors),
        Some(1)
    );
}

#[test]
fn test_console_output_is_not_published() {
    let mut h = Harness::new();
    let (_, serial) = attach(&mut h);
    let mut enc = SerialEncoder::new();
    enc.console("booting\n").end();
    serial.peer_sends(enc.as_bytes());
    h.settle();
    assert!(h.data.take_sent().is_empty());
    assert!(h.discovery.take_sent().is_empty());
}

#[test]
fn test_subscribers_directive_and_forward_handshake() {
    let mut h = Harness::new();
    let (_, serial) = attach(&mut h);
    let code = topic_hash("lights");
    let alias = topic_hash_name("lights");

    let mut enc = SerialEncoder::new();
    enc.subscribers(&[code]).end();
    serial.peer_sends(enc.as_bytes());
    h.settle();

    assert!(h.node.is_subscribed(&alias));
    assert_eq!(h.data.filters(), vec![alias.clone()]);
    let sent = h.discovery.take_sent();
    assert!(matches!(&sent[..], [DiscoveryMessage::Subscribe(s)] if s.topic == alias));
    assert_eq!(serial.take_output(), vec![ACK]);

    h.data
        .deliver(Frame::publish(NodeGuid::generate(), &alias, br#"{"on":true}"#));
    h.settle();
    assert_eq!(serial.take_output(), vec![READY]);

    serial.peer_sends(&[REQUEST]);
    h.settle();
    let mut expected = SerialEncoder::new();
    expected
        .raw(&code.to_le_bytes())
        .string_hash("on")
        .boolean(true)
        .end();
    let mut expected = expected.into_bytes();
    expected.push(ACK);
    assert_eq!(serial.take_output(), expected);
}

#[test]
fn test_forward_then_handler_in_order() {
    let mut h = Harness::new();
    let (_, serial) = attach(&mut h);
    let alias = topic_hash_name("door");

    let mut enc = SerialEncoder::new();
    enc.subscribers(&[topic_hash("door")]).end();
    serial.peer_sends(enc.as_bytes());
    h.settle();
    serial.take_output();
    h.discovery.take_sent();

    let seen = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&seen);
    h.node
        .subscribe(&alias, move |_, _| *sink.borrow_mut() += 1)
        .expect("handler fills the free slot");
    assert!(h.discovery.take_sent().is_empty(), "no second SUB");

    h.data
        .deliver(Frame::publish(NodeGuid::generate(), &alias, br#"{"open":1}"#));
    h.settle();
    assert_eq!(*seen.borrow(), 1);
    assert_eq!(serial.take_output(), vec![READY]);
}

#[test]
fn test_detach_drops_forwarding() {
    let mut h = Harness::new();
    let (id, serial) = attach(&mut h);
    let alias = topic_hash_name("fan");
    let mut enc = SerialEncoder::new();
    enc.subscribers(&[topic_hash("fan")]).end();
    serial.peer_sends(enc.as_bytes());
    h.settle();
    assert!(h.node.is_subscribed(&alias));

    h.node.detach_serial(id).expect("detach");
    assert!(!h.node.is_subscribed(&alias));
    assert!(h.data.filters().is_empty());
    assert_eq!(h.node.serial_links().count(), 0);
}

#[test]
fn test_peer_message_while_forward_pending() {
    let mut h = Harness::new();
    let (_, serial) = attach(&mut h);
    let alias = topic_hash_name("cmd");
    let mut enc = SerialEncoder::new();
    enc.subscribers(&[topic_hash("cmd")]).end();
    serial.peer_sends(enc.as_bytes());
    h.settle();
    serial.take_output();

    h.data
        .deliver(Frame::publish(NodeGuid::generate(), &alias, br#"{"go":1}"#));
    h.settle();
    assert_eq!(serial.take_output(), vec![READY]);

    serial.peer_sends(&message("status", "busy", 1));
    h.settle();
    assert!(serial.take_output().is_empty(), "nested message is not ACKed");
    assert_eq!(h.data.take_sent().len(), 1);

    serial.peer_sends(&[REQUEST]);
    h.settle();
    assert_eq!(serial.take_output().last(), Some(&ACK));
}
