// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Node configuration with validation and environment overrides.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::wire::{FLAGS_LEN, GUID_LEN, MAX_ADDRESS_LEN, MAX_TOPIC_LEN};

/// Well-known UDP port for ADV/SUB datagrams.
pub const DEFAULT_DISCOVERY_PORT: u16 = 11312;

/// Largest discovery datagram sent or accepted.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 512;

/// Size of the longest ADV a node can emit: header with a full-length
/// topic, then the u16 address length and a full-length address.
pub const MIN_DATAGRAM_SIZE: usize =
    2 + GUID_LEN + 1 + MAX_TOPIC_LEN + 1 + FLAGS_LEN + 2 + MAX_ADDRESS_LEN;

/// Baud rates the serial bridge knows how to configure.
pub const SUPPORTED_BAUD_RATES: [u32; 9] = [
    1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200, 230_400,
];

/// Configuration for a [`crate::Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// UDP port for discovery broadcasts (default: 11312).
    pub discovery_port: u16,
    /// Force the local IPv4 address instead of auto-detecting it.
    pub interface: Option<Ipv4Addr>,
    /// Force the broadcast address instead of deriving it from `interface`.
    pub broadcast: Option<Ipv4Addr>,
    /// Discovery datagram size limit (default: 512).
    pub max_datagram_size: usize,
    /// Largest data-plane frame part (default: 16 MiB).
    pub max_frame_size: usize,
    /// Poll timeout used by `spin` for each iteration (default: 10 ms).
    pub spin_interval: Duration,
    /// Minimum delay between two re-advertisements of the same topic
    /// triggered by SUB datagrams. Zero re-advertises on every SUB.
    pub readvertise_holdoff: Duration,
    /// Serial baud rate for `open_serial` (default: 115200).
    pub serial_baud: u32,
    /// Pause after resetting a serial peer before talking to it (default: 1 s).
    pub serial_settle: Duration,
    /// A serial message silent for this long is abandoned (default: 2 s).
    pub serial_message_timeout: Duration,
    /// Budget for draining queued bytes to a serial peer (default: 1 s).
    pub serial_write_timeout: Duration,
    /// Bus messages queued per serial link while the peer is busy
    /// (default: 32). The oldest is dropped on overflow.
    pub serial_forward_queue: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            discovery_port: DEFAULT_DISCOVERY_PORT,
            interface: None,
            broadcast: None,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            max_frame_size: 16 * 1024 * 1024,
            spin_interval: Duration::from_millis(10),
            readvertise_holdoff: Duration::ZERO,
            serial_baud: 115_200,
            serial_settle: Duration::from_secs(1),
            serial_message_timeout: Duration::from_secs(2),
            serial_write_timeout: Duration::from_secs(1),
            serial_forward_queue: 32,
        }
    }
}

impl NodeConfig {
    /// Defaults with `LANBUS_*` environment overrides applied.
    ///
    /// Recognised variables: `LANBUS_DISCOVERY_PORT`, `LANBUS_IFACE`,
    /// `LANBUS_BROADCAST`, `LANBUS_READVERTISE_HOLDOFF_MS`,
    /// `LANBUS_SERIAL_FORWARD_QUEUE`. Unparseable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var(&lookup, "LANBUS_DISCOVERY_PORT") {
            self.discovery_port = v;
        }
        if let Some(v) = parse_var(&lookup, "LANBUS_IFACE") {
            self.interface = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "LANBUS_BROADCAST") {
            self.broadcast = Some(v);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "LANBUS_READVERTISE_HOLDOFF_MS") {
            self.readvertise_holdoff = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var(&lookup, "LANBUS_SERIAL_FORWARD_QUEUE") {
            self.serial_forward_queue = v;
        }
    }

    /// Validate configuration. Returns Ok(()) if valid.
    pub fn validate(&self) -> Result<()> {
        if self.discovery_port == 0 {
            return Err(Error::Config("discovery_port must be > 0".into()));
        }
        if self.max_datagram_size < MIN_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "max_datagram_size must be >= {} (largest ADV)",
                MIN_DATAGRAM_SIZE
            )));
        }
        if self.max_datagram_size > 65_507 {
            return Err(Error::Config(
                "max_datagram_size must be <= 65507 (UDP payload limit)".into(),
            ));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(Error::Config(
                "max_frame_size must be in 1..=u32::MAX".into(),
            ));
        }
        if self.spin_interval.is_zero() {
            return Err(Error::Config("spin_interval must be > 0".into()));
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.serial_baud) {
            return Err(Error::Config(format!(
                "serial_baud {} not supported",
                self.serial_baud
            )));
        }
        if self.serial_message_timeout.is_zero() {
            return Err(Error::Config(
                "serial_message_timeout must be > 0".into(),
            ));
        }
        if self.serial_forward_queue == 0 {
            return Err(Error::Config("serial_forward_queue must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => {
            log::debug!("[config] {}={}", key, raw);
            Some(v)
        }
        Err(_) => {
            log::warn!("[config] ignoring invalid {}='{}'", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery_port, 11312);
        assert_eq!(config.max_datagram_size, 512);
        assert!(config.readvertise_holdoff.is_zero());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LANBUS_DISCOVERY_PORT", "21312"),
            ("LANBUS_IFACE", "192.168.7.2"),
            ("LANBUS_BROADCAST", "192.168.7.255"),
            ("LANBUS_READVERTISE_HOLDOFF_MS", "250"),
            ("LANBUS_SERIAL_FORWARD_QUEUE", "8"),
        ]
        .into_iter()
        .collect();
        let mut config = NodeConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.discovery_port, 21312);
        assert_eq!(config.interface, Some(Ipv4Addr::new(192, 168, 7, 2)));
        assert_eq!(config.broadcast, Some(Ipv4Addr::new(192, 168, 7, 255)));
        assert_eq!(config.readvertise_holdoff, Duration::from_millis(250));
        assert_eq!(config.serial_forward_queue, 8);
    }

    #[test]
    fn test_datagram_floor_fits_largest_advertise() {
        use crate::identity::NodeGuid;
        use crate::wire::AdvertiseMessage;

        let topic = "t".repeat(MAX_TOPIC_LEN);
        let address = "a".repeat(MAX_ADDRESS_LEN);
        let adv = AdvertiseMessage::new(NodeGuid::generate(), &topic, &address)
            .to_bytes()
            .expect("encode");
        assert_eq!(adv.len(), MIN_DATAGRAM_SIZE);
        assert_eq!(MIN_DATAGRAM_SIZE, 498);

        let config = NodeConfig {
            max_datagram_size: MIN_DATAGRAM_SIZE,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_is_ignored() {
        let mut config = NodeConfig::default();
        config.apply_env(|k| match k {
            "LANBUS_DISCOVERY_PORT" => Some("not-a-port".into()),
            "LANBUS_IFACE" => Some("eth0".into()),
            _ => None,
        });
        assert_eq!(config.discovery_port, DEFAULT_DISCOVERY_PORT);
        assert_eq!(config.interface, None);
    }

    #[test]
    fn test_validate_rejects() {
        let bad = [
            NodeConfig {
                discovery_port: 0,
                ..Default::default()
            },
            NodeConfig {
                max_datagram_size: 8,
                ..Default::default()
            },
            NodeConfig {
                max_datagram_size: MIN_DATAGRAM_SIZE - 1,
                ..Default::default()
            },
            NodeConfig {
                serial_forward_queue: 0,
                ..Default::default()
            },
            NodeConfig {
                spin_interval: Duration::ZERO,
                ..Default::default()
            },
            NodeConfig {
                serial_baud: 12345,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{:?}", config);
        }
    }
}
