//! Transport traits used by subscriptions.
//!
//! A [`Channel`] moves whole protocol messages; framing and connection setup
//! belong to its implementation. A [`Dialer`] produces channels.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use vw_core::error::ChannelError;

use crate::messages::{FeedMessage, SubscribeRequest};

/// A duplex message transport owned by one subscription.
///
/// All methods take `&self`: `close` must be callable while another task is
/// blocked in `receive`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send one message.
    async fn send(&self, request: &SubscribeRequest) -> Result<(), ChannelError>;

    /// Block until one message has been read and decoded.
    ///
    /// After an error this must not be called again.
    async fn receive(&self) -> Result<FeedMessage, ChannelError>;

    /// Close the transport without protocol-level teardown.
    ///
    /// Unblocks a concurrent `receive`. Calling it more than once is safe.
    fn close(&self) -> Result<(), ChannelError>;
}

/// Opens channels to a feed endpoint.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        url: &str,
        extra_headers: &HashMap<String, String>,
    ) -> Result<Arc<dyn Channel>, ChannelError>;
}
