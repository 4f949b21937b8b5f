//! Prometheus metrics for the book feed

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::error::Result;
use crate::messages::MessageEnvelope;
use crate::orderbook::{BookSnapshot, Side};

/// Per-market feed counters, cheap to clone
#[derive(Clone)]
pub struct FeedMetrics {
    notifications: IntCounterVec,
    envelopes: IntCounterVec,
    partitions: IntCounterVec,
    resets: IntCounterVec,
    book_levels: IntGaugeVec,
}

impl FeedMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let notifications = IntCounterVec::new(
            Opts::new(
                "book_feed_notifications_total",
                "Account notifications received",
            ),
            &["market"],
        )?;
        let envelopes = IntCounterVec::new(
            Opts::new("book_feed_envelopes_total", "Envelopes emitted by type"),
            &["market", "type"],
        )?;
        let partitions = IntCounterVec::new(
            Opts::new("book_feed_partitions_total", "Crossed books detected"),
            &["market"],
        )?;
        let resets = IntCounterVec::new(
            Opts::new("book_feed_resets_total", "Engine resets after resubscribe"),
            &["market"],
        )?;
        let book_levels = IntGaugeVec::new(
            Opts::new("book_feed_levels", "Price levels in the current book"),
            &["market", "side"],
        )?;

        registry.register(Box::new(notifications.clone()))?;
        registry.register(Box::new(envelopes.clone()))?;
        registry.register(Box::new(partitions.clone()))?;
        registry.register(Box::new(resets.clone()))?;
        registry.register(Box::new(book_levels.clone()))?;

        Ok(Self {
            notifications,
            envelopes,
            partitions,
            resets,
            book_levels,
        })
    }

    pub fn record_notification(&self, market: &str) {
        self.notifications.with_label_values(&[market]).inc();
    }

    pub fn record_envelopes(&self, envelopes: &[MessageEnvelope]) {
        for envelope in envelopes {
            self.envelopes
                .with_label_values(&[&envelope.market, envelope.kind.as_str()])
                .inc();
        }
    }

    pub fn record_partition(&self, market: &str) {
        self.partitions.with_label_values(&[market]).inc();
    }

    pub fn record_reset(&self, market: &str) {
        self.resets.with_label_values(&[market]).inc();
    }

    pub fn set_book_levels(&self, market: &str, snapshot: &BookSnapshot) {
        for side in [Side::Ask, Side::Bid] {
            self.book_levels
                .with_label_values(&[market, side.as_str()])
                .set(snapshot.side(side).len() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageType;

    fn counter(registry: &Registry, name: &str, labels: &[(&str, &str)]) -> f64 {
        registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric().to_vec())
            .find(|metric| {
                labels.iter().all(|(key, value)| {
                    metric
                        .get_label()
                        .iter()
                        .any(|l| l.get_name() == *key && l.get_value() == *value)
                })
            })
            .map(|metric| {
                if metric.has_counter() {
                    metric.get_counter().get_value()
                } else {
                    metric.get_gauge().get_value()
                }
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_counters_by_label() {
        let registry = Registry::new();
        let metrics = FeedMetrics::new(&registry).unwrap();

        metrics.record_notification("BTC-PERP");
        metrics.record_notification("BTC-PERP");
        metrics.record_partition("SOL-PERP");
        metrics.record_envelopes(&[MessageEnvelope {
            kind: MessageType::Quote,
            market: "BTC-PERP".to_string(),
            publish: true,
            payload: "{}".to_string(),
            timestamp: String::new(),
        }]);

        assert_eq!(
            counter(&registry, "book_feed_notifications_total", &[("market", "BTC-PERP")]),
            2.0
        );
        assert_eq!(
            counter(&registry, "book_feed_partitions_total", &[("market", "SOL-PERP")]),
            1.0
        );
        assert_eq!(
            counter(
                &registry,
                "book_feed_envelopes_total",
                &[("market", "BTC-PERP"), ("type", "quote")]
            ),
            1.0
        );
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        FeedMetrics::new(&registry).unwrap();
        assert!(FeedMetrics::new(&registry).is_err());
    }
}
