//! # vw-feed
//!
//! Live trade feed subscriptions for the VWAP system.
//!
//! ## Architecture
//!
//! ```text
//! Dialer ──► Channel ──► Subscription (receive loop task) ──► Events ──► driver
//! ```
//!
//! - [`channel`] — the `Channel` / `Dialer` transport traits
//! - [`ws`] — WebSocket implementation of both
//! - [`messages`] — wire messages and their classification into events
//! - [`subscription`] — handshake, receive loop, bounded shutdown
//! - [`client`] — dial + subscribe for one or many instruments

pub mod channel;
pub mod client;
pub mod messages;
pub mod subscription;
pub mod ws;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use channel::{Channel, Dialer};
pub use client::{FeedClient, FeedSettings};
pub use messages::DecodedEvent;
pub use subscription::{Events, Shutdown, Subscription, SubscriptionState};
