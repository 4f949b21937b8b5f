//! In-process message bus
//!
//! Every topic is a broadcast channel: all current subscribers see each
//! message at most once, late subscribers see nothing older, and a
//! subscriber that falls behind by more than the capacity loses messages.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::market::MarketMeta;
use crate::messages::EnvelopeBatch;

/// Named broadcast topic
#[derive(Debug)]
pub struct Topic<T> {
    name: &'static str,
    sender: broadcast::Sender<T>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone> Topic<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { name, sender }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Deliver to current subscribers, returning how many there were
    pub fn publish(&self, message: T) -> usize {
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(topic = self.name, "Published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

/// Topics shared by the producers, the publisher and the supervisor
#[derive(Debug, Clone)]
pub struct Bus {
    /// Publisher is connected and listening
    pub minion_ready: Topic<()>,
    /// A market producer received its first notification
    pub producer_ready: Topic<()>,
    pub data: Topic<EnvelopeBatch>,
    pub markets: Topic<Arc<[MarketMeta]>>,
    /// Shutdown
    pub cleanup: Topic<()>,
    /// Some producer saw a crossed book
    pub partition_detected: Topic<()>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        Self {
            minion_ready: Topic::new("MinionReady", capacity),
            producer_ready: Topic::new("ProducerReady", capacity),
            data: Topic::new("Data", capacity),
            markets: Topic::new("Markets", capacity),
            cleanup: Topic::new("Cleanup", capacity),
            partition_detected: Topic::new("PartitionDetected", capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn test_broadcast_to_all_subscribers() {
        let bus = Bus::new(16);
        let mut first = bus.cleanup.subscribe();
        let mut second = bus.cleanup.clone().subscribe();

        assert_eq!(bus.cleanup.publish(()), 2);
        assert_eq!(first.recv().await, Ok(()));
        assert_eq!(second.recv().await, Ok(()));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = Bus::new(16);
        assert_eq!(bus.partition_detected.publish(()), 0);

        // no replay for late subscribers
        let mut late = bus.partition_detected.subscribe();
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_lagging_receiver_loses_messages() {
        let topic: Topic<u32> = Topic::new("Numbers", 2);
        let mut rx = topic.subscribe();
        for i in 0..4 {
            topic.publish(i);
        }

        assert_eq!(rx.recv().await, Err(RecvError::Lagged(2)));
        assert_eq!(rx.recv().await, Ok(2));
        assert_eq!(rx.recv().await, Ok(3));
    }

    #[test]
    fn test_topic_names() {
        let bus = Bus::new(1);
        assert_eq!(bus.minion_ready.name(), "MinionReady");
        assert_eq!(bus.data.name(), "Data");
    }
}
