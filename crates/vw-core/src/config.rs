//! Configuration parsing for the VWAP feed runner.
//!
//! Settings come from an optional JSON file. Every field may be omitted; the
//! `effective_*` accessors supply defaults, so an empty object `{}` describes
//! the stock setup (three Coinbase products, 200-trade window).
//!
//! # Example config
//!
//! ```json
//! {
//!   "log": { "module_name": "vw-runner", "log_path": "/tmp/log" },
//!   "feed": {
//!     "url": "wss://ws-feed.exchange.coinbase.com",
//!     "channel": "matches",
//!     "dial_timeout_ms": 10000
//!   },
//!   "instruments": ["BTC-USD", "ETH-USD", "ETH-BTC"],
//!   "window_capacity": 200,
//!   "queue_capacity": 10,
//!   "close_timeout_ms": 2000
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::Instrument;

pub const DEFAULT_FEED_URL: &str = "wss://ws-feed.exchange.coinbase.com";
pub const DEFAULT_CHANNEL: &str = "matches";
pub const DEFAULT_INSTRUMENTS: [&str; 3] = ["BTC-USD", "ETH-USD", "ETH-BTC"];
pub const DEFAULT_WINDOW_CAPACITY: usize = 200;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 10_000;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Logging metadata (module name, log path).
    pub log: Option<LogMeta>,

    /// Exchange feed connection settings.
    pub feed: Option<FeedConfig>,

    /// Instruments to subscribe to, one subscription each.
    pub instruments: Option<Vec<Instrument>>,

    /// Number of most recent trades contributing to each VWAP.
    pub window_capacity: Option<usize>,

    /// Bound of each subscription's event queue.
    pub queue_capacity: Option<usize>,

    /// How long shutdown waits for receive loops before forcing channels closed.
    pub close_timeout_ms: Option<u64>,
}

/// Logging metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Feed connection block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL of the exchange feed.
    pub url: Option<String>,

    /// Feed channel name sent in the subscribe handshake.
    pub channel: Option<String>,

    /// Extra HTTP headers for the WebSocket handshake.
    pub extra_headers: Option<HashMap<String, String>>,

    /// Upper bound on establishing one connection.
    pub dial_timeout_ms: Option<u64>,
}

impl AppConfig {
    pub fn feed_url(&self) -> String {
        self.feed
            .as_ref()
            .and_then(|f| f.url.clone())
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string())
    }

    pub fn channel_name(&self) -> String {
        self.feed
            .as_ref()
            .and_then(|f| f.channel.clone())
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
    }

    pub fn extra_headers(&self) -> HashMap<String, String> {
        self.feed
            .as_ref()
            .and_then(|f| f.extra_headers.clone())
            .unwrap_or_default()
    }

    pub fn dial_timeout(&self) -> Duration {
        let ms = self
            .feed
            .as_ref()
            .and_then(|f| f.dial_timeout_ms)
            .unwrap_or(DEFAULT_DIAL_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn effective_instruments(&self) -> Vec<Instrument> {
        self.instruments.clone().unwrap_or_else(|| {
            DEFAULT_INSTRUMENTS
                .iter()
                .map(|s| Instrument::from(*s))
                .collect()
        })
    }

    pub fn effective_window_capacity(&self) -> usize {
        self.window_capacity.unwrap_or(DEFAULT_WINDOW_CAPACITY)
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms.unwrap_or(DEFAULT_CLOSE_TIMEOUT_MS))
    }

    pub fn module_name(&self) -> String {
        self.log
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "vw-runner".to_string())
    }

    pub fn log_path(&self) -> Option<String> {
        self.log.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Check the effective settings for values the feed cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.feed_url();
        match url::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => {}
            Ok(parsed) => {
                return Err(ConfigError::InvalidUrl {
                    url,
                    reason: format!("unsupported scheme {:?}", parsed.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidUrl {
                    url,
                    reason: e.to_string(),
                });
            }
        }

        let instruments = self.effective_instruments();
        if instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }
        let mut seen = HashSet::new();
        for (idx, instrument) in instruments.iter().enumerate() {
            if instrument.is_empty() {
                return Err(ConfigError::EmptyInstrument(idx));
            }
            if !seen.insert(instrument.as_str()) {
                return Err(ConfigError::DuplicateInstrument(instrument.to_string()));
            }
        }

        if self.effective_queue_capacity() == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
