// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery datagrams: ADV (header + address) and SUB (header only).

use super::header::{MessageHeader, MessageType};
use super::{Reader, MAX_ADDRESS_LEN};
use crate::error::{DecodeError, Error, Result};
use crate::identity::NodeGuid;

/// Publisher announcement: topic plus the endpoint to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseMessage {
    pub header: MessageHeader,
    pub address: String,
}

impl AdvertiseMessage {
    pub fn new(guid: NodeGuid, topic: &str, address: &str) -> Self {
        Self {
            header: MessageHeader::new(guid, topic, MessageType::Advertise),
            address: address.to_owned(),
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        if self.address.len() > MAX_ADDRESS_LEN {
            return Err(Error::InvalidArgument(format!(
                "address is {} bytes (max {})",
                self.address.len(),
                MAX_ADDRESS_LEN
            )));
        }
        self.header.write_to(buf)?;
        buf.extend_from_slice(&(self.address.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.address.as_bytes());
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.header.encoded_len() + 2 + self.address.len());
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    fn read_body(
        header: MessageHeader,
        reader: &mut Reader<'_>,
    ) -> std::result::Result<Self, DecodeError> {
        let len = reader.u16_le("address length")? as usize;
        let address = std::str::from_utf8(reader.take("address", len)?)
            .map_err(|_| DecodeError::InvalidUtf8("address"))?
            .to_owned();
        Ok(Self { header, address })
    }
}

/// A decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    Advertise(AdvertiseMessage),
    Subscribe(MessageHeader),
    /// Reserved type; receivers ignore it.
    Publish(MessageHeader),
}

impl DiscoveryMessage {
    pub fn header(&self) -> &MessageHeader {
        match self {
            DiscoveryMessage::Advertise(adv) => &adv.header,
            DiscoveryMessage::Subscribe(h) | DiscoveryMessage::Publish(h) => h,
        }
    }
}

/// Encode a SUB datagram.
pub fn encode_subscribe(guid: NodeGuid, topic: &str) -> Result<Vec<u8>> {
    MessageHeader::new(guid, topic, MessageType::Subscribe).to_bytes()
}

/// Decode one discovery datagram. Trailing bytes are ignored.
pub fn decode_datagram(buf: &[u8]) -> std::result::Result<DiscoveryMessage, DecodeError> {
    let mut reader = Reader::new(buf);
    let header = MessageHeader::read(&mut reader)?;
    Ok(match header.kind {
        MessageType::Advertise => {
            DiscoveryMessage::Advertise(AdvertiseMessage::read_body(header, &mut reader)?)
        }
        MessageType::Subscribe => DiscoveryMessage::Subscribe(header),
        MessageType::Publish => DiscoveryMessage::Publish(header),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertise_roundtrip() {
        let adv = AdvertiseMessage::new(NodeGuid::generate(), "lidar", "tcp://10.0.0.7:41234");
        let bytes = adv.to_bytes().expect("encode");
        let tail = &bytes[bytes.len() - 22..];
        assert_eq!(&tail[..2], &[20, 0]);
        assert_eq!(&tail[2..], b"tcp://10.0.0.7:41234");
        assert_eq!(
            decode_datagram(&bytes).expect("decode"),
            DiscoveryMessage::Advertise(adv)
        );
    }

    #[test]
    fn test_subscribe_has_no_body() {
        let guid = NodeGuid::generate();
        let bytes = encode_subscribe(guid, "lidar").expect("encode");
        match decode_datagram(&bytes).expect("decode") {
            DiscoveryMessage::Subscribe(h) => {
                assert_eq!(h.guid, guid);
                assert_eq!(h.topic, "lidar");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_address_length_past_end() {
        let adv = AdvertiseMessage::new(NodeGuid::generate(), "t", "tcp://1.2.3.4:5");
        let mut bytes = adv.to_bytes().expect("encode");
        let at = bytes.len() - adv.address.len() - 2;
        bytes[at] = 0xFF;
        bytes[at + 1] = 0x01;
        assert_eq!(
            decode_datagram(&bytes),
            Err(DecodeError::Truncated {
                field: "address",
                needed: 0x01FF,
                available: adv.address.len(),
            })
        );
    }

    #[test]
    fn test_oversized_address_rejected_on_encode() {
        let adv = AdvertiseMessage::new(NodeGuid::zero(), "t", &"x".repeat(MAX_ADDRESS_LEN + 1));
        assert!(matches!(adv.to_bytes(), Err(Error::InvalidArgument(_))));
    }
}
