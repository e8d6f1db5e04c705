//! Feed client — dials the exchange and starts subscriptions.

use std::collections::HashMap;

use tracing::{error, info};
use vw_core::Instrument;
use vw_core::config::AppConfig;
use vw_core::error::SubscriptionError;

use crate::channel::Dialer;
use crate::subscription::Subscription;
use crate::ws::WsDialer;

/// Connection settings shared by every subscription of a client.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: String,
    pub channel_name: String,
    pub extra_headers: HashMap<String, String>,
    pub queue_capacity: usize,
}

impl FeedSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            url: config.feed_url(),
            channel_name: config.channel_name(),
            extra_headers: config.extra_headers(),
            queue_capacity: config.effective_queue_capacity(),
        }
    }
}

/// Opens one channel per instrument and subscribes over it.
pub struct FeedClient<D = WsDialer> {
    dialer: D,
    settings: FeedSettings,
}

impl FeedClient<WsDialer> {
    /// A client dialing real WebSocket connections, configured from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let dialer = WsDialer {
            timeout: config.dial_timeout(),
        };
        Self::new(dialer, FeedSettings::from_config(config))
    }
}

impl<D: Dialer> FeedClient<D> {
    pub fn new(dialer: D, settings: FeedSettings) -> Self {
        Self { dialer, settings }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Dial a new connection and subscribe to `instrument` over it.
    pub async fn subscribe(
        &self,
        instrument: Instrument,
    ) -> Result<Subscription, SubscriptionError> {
        if instrument.is_empty() {
            return Err(SubscriptionError::InvalidInstrument);
        }

        let channel = self
            .dialer
            .dial(&self.settings.url, &self.settings.extra_headers)
            .await
            .map_err(SubscriptionError::Dial)?;

        Subscription::start(
            instrument,
            channel,
            &self.settings.channel_name,
            self.settings.queue_capacity,
        )
        .await
    }

    /// Subscribe to every instrument in order.
    ///
    /// On the first failure the subscriptions already opened are closed
    /// before the error is returned.
    pub async fn subscribe_all(
        &self,
        instruments: &[Instrument],
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let mut subscriptions = Vec::with_capacity(instruments.len());

        for instrument in instruments {
            match self.subscribe(instrument.clone()).await {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => {
                    error!("[{instrument}] subscribe failed: {e}");
                    let deadline = tokio::time::Instant::now();
                    for mut sub in subscriptions {
                        if let Err(close_err) = sub.close(deadline).await {
                            error!(
                                "[{}] close after failed setup: {close_err}",
                                sub.instrument()
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!("subscribed to {} instrument(s)", subscriptions.len());
        Ok(subscriptions)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use vw_core::error::ChannelError;

    use super::*;
    use crate::subscription::SubscriptionState;
    use crate::testing::{ScriptedChannel, ScriptedDialer};

    fn settings() -> FeedSettings {
        FeedSettings {
            url: "wss://feed.test".into(),
            channel_name: "matches".into(),
            extra_headers: HashMap::new(),
            queue_capacity: 10,
        }
    }

    #[tokio::test]
    async fn subscribe_dials_then_handshakes() {
        let (channel, _script) = ScriptedChannel::new();
        let client = FeedClient::new(ScriptedDialer::with(vec![channel.clone()]), settings());

        let mut sub = client.subscribe("ETH-USD".into()).await.unwrap();
        assert_eq!(sub.state(), SubscriptionState::Running);
        assert_eq!(
            channel.sent()[0].channels[0].instruments,
            vec![Instrument::from("ETH-USD")]
        );

        sub.close(tokio::time::Instant::now()).await.unwrap();
        assert_eq!(channel.close_calls(), 1);
    }

    #[tokio::test]
    async fn dial_failure() {
        let client = FeedClient::new(ScriptedDialer::failing(), settings());
        let err = client.subscribe("ETH-USD".into()).await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "dialing feed: dial wss://feed.test: TestABC"
        );
    }

    #[tokio::test]
    async fn missing_instrument_is_rejected_before_dialing() {
        let dialer = ScriptedDialer::failing();
        let client = FeedClient::new(dialer, settings());
        let err = client.subscribe("".into()).await.err().unwrap();
        assert_eq!(err, SubscriptionError::InvalidInstrument);
        assert_eq!(client.dialer.dials.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handshake_failure() {
        let (channel, _script) = ScriptedChannel::new();
        channel.fail_send.store(true, Ordering::SeqCst);
        let client = FeedClient::new(ScriptedDialer::with(vec![channel]), settings());

        let err = client.subscribe("BTC-USD".into()).await.err().unwrap();
        assert!(matches!(
            err,
            SubscriptionError::HandshakeFailed { source: ChannelError::WebSocket(_), .. }
        ));
    }

    #[tokio::test]
    async fn subscribe_all_opens_one_channel_each() {
        let channels: Vec<Arc<ScriptedChannel>> =
            (0..3).map(|_| ScriptedChannel::new().0).collect();
        let client = FeedClient::new(ScriptedDialer::with(channels.clone()), settings());
        let instruments: Vec<Instrument> = ["BTC-USD", "ETH-USD", "ETH-BTC"]
            .into_iter()
            .map(Instrument::from)
            .collect();

        let subs = client.subscribe_all(&instruments).await.unwrap();
        let names: Vec<&str> = subs.iter().map(|s| s.instrument().as_str()).collect();
        assert_eq!(names, vec!["BTC-USD", "ETH-USD", "ETH-BTC"]);
        for channel in &channels {
            assert_eq!(channel.sent().len(), 1);
        }
    }

    #[tokio::test]
    async fn subscribe_all_closes_opened_on_failure() {
        let (first, _script) = ScriptedChannel::new();
        let (second, _script2) = ScriptedChannel::new();
        second.fail_send.store(true, Ordering::SeqCst);
        let dialer = ScriptedDialer::with(vec![first.clone(), second.clone()]);
        let client = FeedClient::new(dialer, settings());

        let instruments = vec![
            Instrument::from("BTC-USD"),
            Instrument::from("ETH-USD"),
            Instrument::from("ETH-BTC"),
        ];
        let err = client.subscribe_all(&instruments).await.err().unwrap();

        assert!(matches!(
            err,
            SubscriptionError::HandshakeFailed { ref instrument, .. } if instrument == "ETH-USD"
        ));
        assert_eq!(first.close_calls(), 1);
        assert_eq!(second.close_calls(), 1);
    }
}
