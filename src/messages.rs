//! Normalized data messages and the envelopes carrying them to fan-out workers

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::orderbook::{BookSnapshot, PriceLevel, Quote};

/// Protocol version stamped on every data message (mango v3)
pub const PROTOCOL_VERSION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "l2snapshot")]
    L2Snapshot,
    #[serde(rename = "l2update")]
    L2Update,
    #[serde(rename = "quote")]
    Quote,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::L2Snapshot => "l2snapshot",
            MessageType::L2Update => "l2update",
            MessageType::Quote => "quote",
        }
    }
}

/// Full L2 snapshot or L2 diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub market: String,
    pub timestamp: String,
    pub slot: u64,
    pub version: u32,
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

/// Best bid and ask; absent sides are omitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub market: String,
    pub timestamp: String,
    pub slot: u64,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<PriceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<PriceLevel>,
}

/// Fields shared by every message derived from one notification
#[derive(Debug, Clone, Copy)]
pub struct MessageHeader<'a> {
    pub market: &'a str,
    pub timestamp: &'a str,
    pub slot: u64,
}

impl MessageHeader<'_> {
    pub fn snapshot(&self, snapshot: &BookSnapshot) -> L2Message {
        self.l2(MessageType::L2Snapshot, &snapshot.asks, &snapshot.bids)
    }

    pub fn update(&self, asks: &[PriceLevel], bids: &[PriceLevel]) -> L2Message {
        self.l2(MessageType::L2Update, asks, bids)
    }

    pub fn quote(&self, quote: &Quote) -> QuoteMessage {
        QuoteMessage {
            kind: MessageType::Quote,
            market: self.market.to_string(),
            timestamp: self.timestamp.to_string(),
            slot: self.slot,
            version: PROTOCOL_VERSION,
            best_ask: quote.best_ask,
            best_bid: quote.best_bid,
        }
    }

    fn l2(&self, kind: MessageType, asks: &[PriceLevel], bids: &[PriceLevel]) -> L2Message {
        L2Message {
            kind,
            market: self.market.to_string(),
            timestamp: self.timestamp.to_string(),
            slot: self.slot,
            version: PROTOCOL_VERSION,
            asks: asks.to_vec(),
            bids: bids.to_vec(),
        }
    }
}

/// Wire unit handed to fan-out workers.
///
/// `publish = false` marks messages that are cached for new subscribers but
/// not broadcast to existing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub market: String,
    pub publish: bool,
    /// JSON-serialized message body
    pub payload: String,
    pub timestamp: String,
}

impl MessageEnvelope {
    pub fn l2(message: &L2Message, publish: bool) -> Result<Self> {
        Ok(Self {
            kind: message.kind,
            market: message.market.clone(),
            publish,
            payload: serde_json::to_string(message)?,
            timestamp: message.timestamp.clone(),
        })
    }

    pub fn quote(message: &QuoteMessage, publish: bool) -> Result<Self> {
        Ok(Self {
            kind: message.kind,
            market: message.market.clone(),
            publish,
            payload: serde_json::to_string(message)?,
            timestamp: message.timestamp.clone(),
        })
    }
}

/// Envelopes derived from one notification, in emission order
pub type EnvelopeBatch = Arc<[MessageEnvelope]>;

/// ISO-8601 UTC timestamp with millisecond precision
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
