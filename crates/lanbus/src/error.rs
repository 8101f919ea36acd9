// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for lanbus.

use std::fmt;

/// Result type for lanbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed or truncated wire data.
///
/// Decoders return this instead of panicking; they never index past the
/// end of the buffer they were handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A length-prefixed field claims more bytes than remain.
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    /// Topic name longer than [`crate::wire::MAX_TOPIC_LEN`].
    TopicTooLong(usize),
    /// A text field is not valid UTF-8.
    InvalidUtf8(&'static str),
    /// Message type byte outside 1..=3.
    UnknownMessageType(u8),
    /// A data-plane part exceeds the configured maximum.
    FrameTooLarge { size: usize, max: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated {
                field,
                needed,
                available,
            } => write!(
                f,
                "truncated {}: need {} bytes, {} available",
                field, needed, available
            ),
            DecodeError::TopicTooLong(len) => write!(f, "topic too long: {} bytes", len),
            DecodeError::InvalidUtf8(field) => write!(f, "{} is not valid UTF-8", field),
            DecodeError::UnknownMessageType(t) => write!(f, "unknown message type: {}", t),
            DecodeError::FrameTooLarge { size, max } => {
                write!(f, "frame part too large: {} > {}", size, max)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Error type for lanbus operations.
#[derive(Debug)]
pub enum Error {
    // Lifecycle
    /// An operation was attempted before `Node::init`.
    NotInitialized,
    /// Operation not valid in the current state (e.g. a second `init`).
    InvalidState(String),

    // Registry
    /// The topic is already advertised by this node.
    AlreadyAdvertised(String),
    /// The topic already has a handler of the requested kind.
    AlreadySubscribed(String),
    /// `unsubscribe` on a topic without a handler.
    NotSubscribed(String),
    /// `publish` on a topic this node has not advertised.
    NotAdvertised(String),
    /// Empty or oversized topic, zero timer period, bad address.
    InvalidArgument(String),

    // Wire
    /// Malformed discovery datagram or data-plane frame.
    Decode(DecodeError),
    /// CRC mismatch on a serial link.
    LinkIntegrity { expected: u16, actual: u16 },

    // Transport
    /// Socket, bind, connect or serial device failure.
    Transport(String),
    /// The reactor poll call failed; fatal to `spin`.
    Poll(std::io::Error),

    // Configuration
    Config(String),
    UnknownSerialLink(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotInitialized => write!(f, "Node not initialized"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::AlreadyAdvertised(topic) => write!(f, "Topic already advertised: {}", topic),
            Error::AlreadySubscribed(topic) => write!(f, "Topic already subscribed: {}", topic),
            Error::NotSubscribed(topic) => write!(f, "Topic not subscribed: {}", topic),
            Error::NotAdvertised(topic) => write!(f, "Topic not advertised: {}", topic),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::LinkIntegrity { expected, actual } => write!(
                f,
                "Serial CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
                expected, actual
            ),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Poll(e) => write!(f, "Poll error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::UnknownSerialLink(id) => write!(f, "Unknown serial link: {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            Error::Poll(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_topic() {
        let e = Error::NotAdvertised("chassis/imu".into());
        assert_eq!(e.to_string(), "Topic not advertised: chassis/imu");
    }

    #[test]
    fn test_decode_error_is_source() {
        let e: Error = DecodeError::UnknownMessageType(9).into();
        let src = std::error::Error::source(&e).map(|s| s.to_string());
        assert_eq!(src.as_deref(), Some("unknown message type: 9"));
    }

    #[test]
    fn test_link_integrity_hex() {
        let e = Error::LinkIntegrity {
            expected: 0x00AB,
            actual: 0x1234,
        };
        assert_eq!(
            e.to_string(),
            "Serial CRC mismatch: expected 0x00AB, got 0x1234"
        );
    }
}
