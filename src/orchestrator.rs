//! Per-market feed loop
//!
//! Drives one market's accounts stream through its order book engine and
//! publishes every non-empty batch of envelopes on the bus.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bus::Bus;
use crate::error::Result;
use crate::market::MarketMeta;
use crate::messages::EnvelopeBatch;
use crate::metrics::FeedMetrics;
use crate::orderbook::{BookSideDecoder, EngineOptions, OrderBookEngine, PartitionHook, SlabDecoder};
use crate::rpc::{AccountsStream, RpcClient, RpcClientConfig};

/// Producer for a single market
pub struct FeedOrchestrator<S, D> {
    market: String,
    stream: S,
    engine: OrderBookEngine<D>,
    bus: Bus,
    metrics: FeedMetrics,
}

impl FeedOrchestrator<RpcClient, SlabDecoder> {
    /// Producer reading the market's book side accounts from an RPC node
    pub fn connect(
        config: RpcClientConfig,
        market: &MarketMeta,
        bus: Bus,
        metrics: FeedMetrics,
    ) -> Result<Self> {
        let decoder = SlabDecoder::for_market(market)?;
        Self::new(market, RpcClient::new(config, market), decoder, bus, metrics)
    }
}

impl<S: AccountsStream, D: BookSideDecoder> FeedOrchestrator<S, D> {
    pub fn new(
        market: &MarketMeta,
        stream: S,
        decoder: D,
        bus: Bus,
        metrics: FeedMetrics,
    ) -> Result<Self> {
        let codec = market.codec()?;

        // Only signals: this producer's own listener does the single resubscribe
        let on_partition_detected: PartitionHook = {
            let topic = bus.partition_detected.clone();
            let metrics = metrics.clone();
            let market = market.name.clone();
            Box::new(move || {
                metrics.record_partition(&market);
                topic.publish(());
            })
        };

        let engine = OrderBookEngine::new(
            EngineOptions {
                symbol: market.name.clone(),
                price_decimal_places: codec.price_decimal_places(),
                size_decimal_places: codec.size_decimal_places(),
            },
            decoder,
            on_partition_detected,
        );

        Ok(Self {
            market: market.name.clone(),
            stream,
            engine,
            bus,
            metrics,
        })
    }

    /// Run until the stream ends, shutdown is requested or an error occurs.
    ///
    /// Errors are returned, not retried: the process supervisor owns restarts.
    pub async fn run(mut self) -> Result<()> {
        info!(market = %self.market, "Starting producer");

        let mut cleanup = self.bus.cleanup.subscribe();
        let listener = self.spawn_partition_listener();

        let result = self.consume(&mut cleanup).await;
        listener.abort();
        result
    }

    /// Resubscribe on every crossed book, this producer's own included.
    ///
    /// Subscribed before the feed loop starts, so no signal from the engine
    /// is missed.
    fn spawn_partition_listener(&self) -> JoinHandle<()> {
        let mut partitions = self.bus.partition_detected.subscribe();
        let reset = self.stream.reset_handle();
        let market = self.market.clone();

        tokio::spawn(async move {
            loop {
                match partitions.recv().await {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        debug!(market = %market, "Partition detected, resubscribing");
                        reset.reset();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn consume(&mut self, cleanup: &mut broadcast::Receiver<()>) -> Result<()> {
        let mut ready = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cleanup.recv() => {
                    info!(market = %self.market, "Shutting down producer");
                    return Ok(());
                }
                next = self.stream.next_notification() => next?,
            };

            let Some(notification) = next else {
                info!(market = %self.market, "Notification stream ended");
                return Ok(());
            };

            if !ready {
                ready = true;
                self.bus.producer_ready.publish(());
                info!(market = %self.market, "Producer started");
            }
            self.metrics.record_notification(&self.market);

            if notification.reset {
                self.engine.reset();
                self.metrics.record_reset(&self.market);
                continue;
            }

            let envelopes = self.engine.map(&notification)?;
            if envelopes.is_empty() {
                continue;
            }

            self.metrics.record_envelopes(&envelopes);
            if let Some(snapshot) = self.engine.current_snapshot() {
                self.metrics.set_book_levels(&self.market, snapshot);
            }
            self.bus.data.publish(EnvelopeBatch::from(envelopes));
        }
    }
}
