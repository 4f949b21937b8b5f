//! Perp Book Feed - L2 Order Book Library
//!
//! This crate reconstructs L2 order books of Mango v3 perp markets from
//! their on-chain book side accounts and turns every account change into
//! normalized snapshot, diff and quote messages for downstream fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};

pub mod bus;
pub mod config;
pub mod error;
pub mod market;
pub mod messages;
pub mod metrics;
pub mod orchestrator;
pub mod orderbook;
pub mod parser;
pub mod publisher;
pub mod retry;
pub mod rpc;

#[cfg(test)]
pub(crate) mod testutil;

pub use bus::{Bus, Topic};
pub use config::Config;
pub use error::{FeedError, Result};
pub use market::{MarketCatalog, MarketMeta};
pub use messages::{EnvelopeBatch, L2Message, MessageEnvelope, MessageType, QuoteMessage};
pub use metrics::FeedMetrics;
pub use orchestrator::FeedOrchestrator;
pub use orderbook::{
    BookSideDecoder, BookSnapshot, EngineOptions, LevelCodec, OrderBookEngine, PriceLevel, Quote,
    RestingOrder, Side, SlabDecoder,
};
pub use publisher::{IpcFrame, Publisher};
pub use rpc::{AccountsData, AccountsNotification, AccountsStream, ResetHandle, RpcClient};

/// Application state shared with the health server
#[derive(Debug, Default)]
pub struct AppState {
    /// Markets being served
    pub markets: Vec<String>,
    /// Producers that received their first notification
    pub producers_ready: AtomicUsize,
}

impl AppState {
    pub fn new(markets: Vec<String>) -> Self {
        Self {
            markets,
            producers_ready: AtomicUsize::new(0),
        }
    }

    pub fn set_producers_ready(&self, ready: usize) {
        self.producers_ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.producers_ready.load(Ordering::Relaxed) >= self.markets.len()
    }
}
