//! Order book engine
//!
//! Owns one market's L2 state. Every accounts notification is turned into
//! zero or more envelopes: a snapshot and quote once both sides are known,
//! then `l2update` + unpublished `l2snapshot` (+ `quote` when the top of
//! book moved) for every notification that changes a level.

use tracing::{debug, info, warn};

use super::{BookSideDecoder, BookSnapshot, LevelCodec, PriceLevel, Quote, RestingOrder, Side};
use crate::error::Result;
use crate::messages::{timestamp_now, MessageEnvelope, MessageHeader};
use crate::rpc::AccountsNotification;

/// Invoked when a notification would cross the book
pub type PartitionHook = Box<dyn FnMut() + Send>;

/// Per-market engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub symbol: String,
    pub price_decimal_places: u32,
    pub size_decimal_places: u32,
}

#[derive(Debug)]
struct LiveBook {
    snapshot: BookSnapshot,
    quote: Quote,
}

/// L2 reconstruction and diff engine for a single market.
///
/// Not meant to be shared: the feed loop driving it is its only caller.
pub struct OrderBookEngine<D> {
    symbol: String,
    codec: LevelCodec,
    decoder: D,
    on_partition_detected: PartitionHook,
    asks_orders: Option<Vec<RestingOrder>>,
    bids_orders: Option<Vec<RestingOrder>>,
    /// Present once both sides have been seen
    live: Option<LiveBook>,
}

impl<D: BookSideDecoder> OrderBookEngine<D> {
    pub fn new(options: EngineOptions, decoder: D, on_partition_detected: PartitionHook) -> Self {
        Self {
            symbol: options.symbol,
            codec: LevelCodec::new(options.price_decimal_places, options.size_decimal_places),
            decoder,
            on_partition_detected,
            asks_orders: None,
            bids_orders: None,
            live: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    pub fn current_snapshot(&self) -> Option<&BookSnapshot> {
        self.live.as_ref().map(|live| &live.snapshot)
    }

    pub fn current_quote(&self) -> Option<&Quote> {
        self.live.as_ref().map(|live| &live.quote)
    }

    /// Map one notification to the envelopes it produces, in emission order
    pub fn map(&mut self, notification: &AccountsNotification) -> Result<Vec<MessageEnvelope>> {
        // all envelopes of one notification share the timestamp
        let timestamp = timestamp_now();
        let slot = notification.slot;
        let data = &notification.accounts_data;
        let asks_changed = data.asks.is_some();
        let bids_changed = data.bids.is_some();

        if let Some(raw) = &data.asks {
            self.asks_orders = Some(self.decoder.decode(Side::Ask, raw)?);
        }
        if let Some(raw) = &data.bids {
            self.bids_orders = Some(self.decoder.decode(Side::Bid, raw)?);
        }

        let Some(live) = &self.live else {
            return self.initialize(slot, &timestamp);
        };

        let candidate = BookSnapshot {
            asks: if asks_changed {
                self.levels(Side::Ask)
            } else {
                live.snapshot.asks.clone()
            },
            bids: if bids_changed {
                self.levels(Side::Bid)
            } else {
                live.snapshot.bids.clone()
            },
        };

        if candidate.is_crossed() {
            partition_detected(&self.symbol, &mut self.on_partition_detected, slot, &candidate);
            return Ok(Vec::new());
        }

        let asks_diff = if asks_changed {
            self.codec.diff(&live.snapshot.asks, &candidate.asks)
        } else {
            Vec::new()
        };
        let bids_diff = if bids_changed {
            self.codec.diff(&live.snapshot.bids, &candidate.bids)
        } else {
            Vec::new()
        };

        if asks_diff.is_empty() && bids_diff.is_empty() {
            return Ok(Vec::new());
        }

        let header = MessageHeader {
            market: &self.symbol,
            timestamp: &timestamp,
            slot,
        };

        // update first, the snapshot already includes it
        let mut envelopes = vec![
            MessageEnvelope::l2(&header.update(&asks_diff, &bids_diff), true)?,
            MessageEnvelope::l2(&header.snapshot(&candidate), false)?,
        ];

        let quote = candidate.quote();
        if quote != live.quote {
            envelopes.push(MessageEnvelope::quote(&header.quote(&quote), true)?);
        }

        self.live = Some(LiveBook {
            snapshot: candidate,
            quote,
        });

        Ok(envelopes)
    }

    /// Forget all state; output resumes once both sides are seen again
    pub fn reset(&mut self) {
        if self.live.is_none() {
            return;
        }

        self.live = None;
        self.asks_orders = None;
        self.bids_orders = None;
        info!(market = %self.symbol, "Order book reset");
    }

    fn initialize(&mut self, slot: u64, timestamp: &str) -> Result<Vec<MessageEnvelope>> {
        let (Some(asks), Some(bids)) = (&self.asks_orders, &self.bids_orders) else {
            return Ok(Vec::new());
        };

        let snapshot = BookSnapshot {
            asks: self.codec.levels(asks),
            bids: self.codec.levels(bids),
        };

        if snapshot.is_crossed() {
            partition_detected(&self.symbol, &mut self.on_partition_detected, slot, &snapshot);
            return Ok(Vec::new());
        }

        let quote = snapshot.quote();
        let header = MessageHeader {
            market: &self.symbol,
            timestamp,
            slot,
        };
        let envelopes = vec![
            MessageEnvelope::l2(&header.snapshot(&snapshot), true)?,
            MessageEnvelope::quote(&header.quote(&quote), true)?,
        ];

        debug!(
            market = %self.symbol,
            slot,
            asks = snapshot.asks.len(),
            bids = snapshot.bids.len(),
            "Order book initialized"
        );
        self.live = Some(LiveBook { snapshot, quote });

        Ok(envelopes)
    }

    fn levels(&self, side: Side) -> Vec<PriceLevel> {
        let orders = match side {
            Side::Ask => &self.asks_orders,
            Side::Bid => &self.bids_orders,
        };
        orders
            .as_deref()
            .map(|orders| self.codec.levels(orders))
            .unwrap_or_default()
    }
}

fn partition_detected(symbol: &str, hook: &mut PartitionHook, slot: u64, candidate: &BookSnapshot) {
    warn!(
        market = %symbol,
        slot,
        best_bid = ?candidate.bids.first().map(|l| l.price()),
        best_ask = ?candidate.asks.first().map(|l| l.price()),
        "PartitionDetected: crossed L2 book"
    );
    hook();
}
