//! Feed wire messages and their classification.
//!
//! Outbound, a subscription sends one [`SubscribeRequest`]. Inbound, every
//! message is a [`FeedMessage`] routed by its `type` field:
//!
//! - `match`, `last_match` → [`DecodedEvent::Trade`]
//! - `error` → [`DecodedEvent::ProtocolError`] with the exchange's message
//! - `subscriptions` → [`DecodedEvent::Ignored`] (acknowledgment)
//! - anything else → [`DecodedEvent::ProtocolError`] naming the kind

use serde::{Deserialize, Serialize};
use vw_core::error::FeedError;
use vw_core::{Instrument, TradeRecord};

pub const KIND_SUBSCRIBE: &str = "subscribe";
pub const KIND_MATCH: &str = "match";
pub const KIND_LAST_MATCH: &str = "last_match";
pub const KIND_ERROR: &str = "error";
pub const KIND_SUBSCRIPTIONS: &str = "subscriptions";

/// Subscribe handshake, e.g.
/// `{"type":"subscribe","channels":[{"name":"matches","product_ids":["BTC-USD"]}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub channels: Vec<ChannelSubscription>,
}

/// One feed channel entry of a [`SubscribeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub name: String,
    #[serde(rename = "product_ids")]
    pub instruments: Vec<Instrument>,
}

impl SubscribeRequest {
    /// Request `channel` updates for a single instrument.
    pub fn for_instrument(channel: &str, instrument: &Instrument) -> Self {
        Self {
            kind: KIND_SUBSCRIBE.to_string(),
            channels: vec![ChannelSubscription {
                name: channel.to_string(),
                instruments: vec![instrument.clone()],
            }],
        }
    }
}

/// An inbound feed message. Fields a kind does not use are left at their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub message: String,
}

/// One inbound message after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Trade(TradeRecord),
    ProtocolError(FeedError),
    Ignored,
}

impl FeedMessage {
    /// A trade message, mostly for tests and replay.
    pub fn trade(instrument: &str, size: &str, price: &str) -> Self {
        Self {
            kind: KIND_MATCH.to_string(),
            product_id: instrument.to_string(),
            size: size.to_string(),
            price: price.to_string(),
            ..Default::default()
        }
    }

    /// Classify by kind and, for trades, parse units and unit price.
    pub fn decode(&self) -> DecodedEvent {
        match self.kind.as_str() {
            KIND_MATCH | KIND_LAST_MATCH => match self.trade_record() {
                Ok(trade) => DecodedEvent::Trade(trade),
                Err(e) => DecodedEvent::ProtocolError(e),
            },
            KIND_ERROR => DecodedEvent::ProtocolError(FeedError::Exchange(self.message.clone())),
            KIND_SUBSCRIPTIONS => DecodedEvent::Ignored,
            other => {
                DecodedEvent::ProtocolError(FeedError::UnexpectedMessageKind(other.to_string()))
            }
        }
    }

    fn trade_record(&self) -> Result<TradeRecord, FeedError> {
        let units = parse_decimal("size", &self.size)?;
        if units <= 0.0 {
            return Err(decode_failed("size", &self.size, "must be positive"));
        }

        let unit_price = parse_decimal("price", &self.price)?;
        if unit_price < 0.0 {
            return Err(decode_failed("price", &self.price, "must not be negative"));
        }

        if !(units * unit_price).is_finite() {
            return Err(decode_failed("price", &self.price, "notional overflows"));
        }

        Ok(TradeRecord::new(units, unit_price))
    }
}

/// Parse a decimal string such as `"30000.5"` into a finite `f64`.
fn parse_decimal(field: &'static str, value: &str) -> Result<f64, FeedError> {
    let parsed: f64 = fast_float2::parse(value)
        .map_err(|e| decode_failed(field, value, &e.to_string()))?;
    if !parsed.is_finite() {
        return Err(decode_failed(field, value, "not a finite number"));
    }
    Ok(parsed)
}

fn decode_failed(field: &'static str, value: &str, reason: &str) -> FeedError {
    FeedError::DecodeFailed {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
