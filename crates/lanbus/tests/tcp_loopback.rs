// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two TCP data planes talking over 127.0.0.1.

use std::net::Ipv4Addr;
use std::time::Duration;

use lanbus::dataplane::{DataPlane, DataPlaneEvent, Frame, TcpDataPlane};
use lanbus::NodeGuid;
use mio::{Events, Poll, Token};

const BASE: Token = Token(100);
const MAX_PART: usize = 1 << 20;

fn pump(poll: &mut Poll, plane: &mut TcpDataPlane, events: &mut Events) {
    poll.poll(events, Some(Duration::from_millis(10)))
        .expect("poll");
    for event in events.iter() {
        plane.on_ready(event.token(), event.is_readable(), event.is_writable());
    }
}

#[test]
fn test_frames_cross_loopback_with_prefix_filter() {
    let mut pub_poll = Poll::new().expect("poll");
    let mut sub_poll = Poll::new().expect("poll");
    let mut events = Events::with_capacity(64);

    let mut publisher = TcpDataPlane::bind(Ipv4Addr::LOCALHOST, MAX_PART).expect("bind");
    publisher
        .register(pub_poll.registry(), BASE)
        .expect("register");
    let mut subscriber = TcpDataPlane::bind(Ipv4Addr::LOCALHOST, MAX_PART).expect("bind");
    subscriber
        .register(sub_poll.registry(), BASE)
        .expect("register");

    subscriber.add_filter("sensors/");
    let endpoint = publisher.endpoint().to_owned();
    subscriber.connect(&endpoint).expect("connect");

    let guid = NodeGuid::generate();
    let mut received = None;
    for _ in 0..300 {
        publisher
            .send(&Frame::publish(guid, "other", b"ignored"))
            .expect("send");
        publisher
            .send(&Frame::publish(guid, "sensors/temp", b"21.5"))
            .expect("send");
        pump(&mut pub_poll, &mut publisher, &mut events);
        pump(&mut sub_poll, &mut subscriber, &mut events);

        while let Some(event) = subscriber.next_event() {
            match event {
                DataPlaneEvent::Frame(frame) => {
                    assert_eq!(frame.topic, "sensors/temp", "filter let a frame through");
                    received = Some(frame);
                }
                DataPlaneEvent::Disconnected(ep) => panic!("unexpected disconnect from {ep}"),
            }
        }
        if received.is_some() {
            break;
        }
    }

    let frame = received.expect("no frame crossed the loopback link");
    assert_eq!(frame.payload, b"21.5");
    assert_eq!(frame.header.guid, guid);
    assert_eq!(frame.header.topic, "sensors/temp");

    drop(publisher);
    let mut lost = None;
    for _ in 0..300 {
        pump(&mut sub_poll, &mut subscriber, &mut events);
        while let Some(event) = subscriber.next_event() {
            if let DataPlaneEvent::Disconnected(ep) = event {
                lost = Some(ep);
            }
        }
        if lost.is_some() {
            break;
        }
    }
    assert_eq!(lost.as_deref(), Some(endpoint.as_str()));
}
