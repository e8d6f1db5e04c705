//! Typed error definitions for the VWAP feed system.
//!
//! Transport errors carry their cause as a string so they can be cloned into
//! event streams and compared in tests. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate with `anyhow::Result`.

use thiserror::Error;

/// Errors from [`CircularWindow`](crate::window::CircularWindow) access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowError {
    /// Index outside `[0, len)`.
    #[error("index {index} out of range for window of length {len}")]
    OutOfRange { index: usize, len: usize },
}

/// Transport-level failures of a duplex message channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The connection could not be established.
    #[error("dial {url}: {reason}")]
    Dial { url: String, reason: String },

    /// The connection was not established before the dial timeout.
    #[error("dial {url}: timed out after {timeout_ms}ms")]
    DialTimeout { url: String, timeout_ms: u64 },

    /// WebSocket protocol or I/O error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The channel has been closed locally or by the peer.
    #[error("channel closed")]
    Closed,

    /// An outbound message could not be serialized.
    #[error("encode message: {0}")]
    Encode(String),

    /// An inbound frame was not a valid message.
    #[error("decode message: {0}")]
    Decode(String),

    /// Closing the underlying transport failed.
    #[error("close failed: {0}")]
    CloseFailed(String),
}

/// A protocol error delivered on a subscription's event sequence.
///
/// Only [`FeedError::TransportReadFailed`] is terminal; every other variant is
/// reported for one message and the receive loop carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("read match: {0}")]
    TransportReadFailed(ChannelError),

    /// An `error` message sent by the exchange.
    #[error("error message received: {0:?}")]
    Exchange(String),

    #[error("received unexpected message with type {0:?}")]
    UnexpectedMessageKind(String),

    /// A trade message whose numeric fields could not be used.
    #[error("parse {field} from {value:?}: {reason}")]
    DecodeFailed {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl FeedError {
    /// Whether the subscription that produced this error has stopped reading.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TransportReadFailed(_))
    }
}

/// Errors from creating or closing a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("instrument is required")]
    InvalidInstrument,

    #[error("dialing feed: {0}")]
    Dial(ChannelError),

    #[error("subscribing to {channel} channel for instrument {instrument}: {source}")]
    HandshakeFailed {
        instrument: String,
        channel: String,
        source: ChannelError,
    },

    #[error("close connection: {0}")]
    ChannelCloseFailed(ChannelError),

    /// The receive loop did not acknowledge the stop signal before the close
    /// deadline. Logged by `close`, never returned from it.
    #[error("receive loop for {instrument} took too long to exit")]
    ShutdownTimeout { instrument: String },
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid feed url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("at least one instrument is required")]
    NoInstruments,

    #[error("instrument at position {0} is empty")]
    EmptyInstrument(usize),

    #[error("instrument {0} is listed more than once")]
    DuplicateInstrument(String),

    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,
}
