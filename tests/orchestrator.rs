//! Feed loop behaviour against a scripted accounts stream

mod common;

use common::{asks, bids, market, notification, JsonDecoder};
use perp_book_feed::error::Result;
use perp_book_feed::{
    AccountsNotification, AccountsStream, Bus, EnvelopeBatch, FeedError, FeedMetrics,
    FeedOrchestrator, MessageType, ResetHandle,
};
use prometheus::Registry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct ScriptedStream {
    rx: mpsc::UnboundedReceiver<Result<AccountsNotification>>,
    reset: ResetHandle,
}

impl AccountsStream for ScriptedStream {
    async fn next_notification(&mut self) -> Result<Option<AccountsNotification>> {
        self.rx.recv().await.transpose()
    }

    fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }
}

struct Harness {
    bus: Bus,
    tx: mpsc::UnboundedSender<Result<AccountsNotification>>,
    reset: ResetHandle,
    ready: broadcast::Receiver<()>,
    data: broadcast::Receiver<EnvelopeBatch>,
    task: JoinHandle<Result<()>>,
}

impl Harness {
    fn start() -> Self {
        let bus = Bus::new(64);
        let (tx, rx) = mpsc::unbounded_channel();
        let reset = ResetHandle::default();
        let ready = bus.producer_ready.subscribe();
        let data = bus.data.subscribe();

        let stream = ScriptedStream {
            rx,
            reset: reset.clone(),
        };
        let metrics = FeedMetrics::new(&Registry::new()).unwrap();
        let orchestrator =
            FeedOrchestrator::new(&market(), stream, JsonDecoder, bus.clone(), metrics).unwrap();
        let task = tokio::spawn(orchestrator.run());

        Self {
            bus,
            tx,
            reset,
            ready,
            data,
            task,
        }
    }

    fn send(&self, notification: AccountsNotification) {
        self.tx.send(Ok(notification)).unwrap();
    }

    async fn next_batch(&mut self) -> EnvelopeBatch {
        timeout(WAIT, self.data.recv()).await.unwrap().unwrap()
    }

    async fn initialize(&mut self) -> EnvelopeBatch {
        self.send(notification(Some(&[("100", "1")]), Some(&[("99", "1")]), 1));
        timeout(WAIT, self.ready.recv()).await.unwrap().unwrap();
        self.next_batch().await
    }
}

fn kinds(batch: &EnvelopeBatch) -> Vec<MessageType> {
    batch.iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn readiness_is_announced_once() {
    let mut h = Harness::start();

    h.send(asks(&[("100", "1")], 1));
    timeout(WAIT, h.ready.recv()).await.unwrap().unwrap();

    h.send(bids(&[("99", "1")], 2));
    let batch = h.next_batch().await;
    assert_eq!(kinds(&batch), vec![MessageType::L2Snapshot, MessageType::Quote]);

    h.send(asks(&[("100", "2")], 3));
    h.next_batch().await;
    assert_eq!(h.ready.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn batches_are_forwarded_in_order() {
    let mut h = Harness::start();
    h.initialize().await;

    h.send(asks(&[("100", "1"), ("101", "1")], 2));
    h.send(asks(&[("99.5", "1"), ("100", "1"), ("101", "1")], 3));

    let first = h.next_batch().await;
    assert_eq!(kinds(&first), vec![MessageType::L2Update, MessageType::L2Snapshot]);
    assert!(first[0].payload.contains(r#""slot":2"#));

    let second = h.next_batch().await;
    assert_eq!(
        kinds(&second),
        vec![MessageType::L2Update, MessageType::L2Snapshot, MessageType::Quote]
    );
    assert!(second[0].payload.contains(r#""slot":3"#));
}

#[tokio::test]
async fn reset_notification_rearms_initialization() {
    let mut h = Harness::start();
    h.initialize().await;

    h.send(AccountsNotification::reset());
    h.send(asks(&[("100", "1")], 5));
    h.send(bids(&[("99", "1")], 6));

    // nothing until both sides are seen again, then a fresh snapshot
    let batch = h.next_batch().await;
    assert_eq!(kinds(&batch), vec![MessageType::L2Snapshot, MessageType::Quote]);
    assert!(batch[0].payload.contains(r#""slot":6"#));
}

#[tokio::test]
async fn crossed_book_signals_partition_and_resubscribes() {
    let mut h = Harness::start();
    let mut partitions = h.bus.partition_detected.subscribe();
    h.initialize().await;

    h.send(bids(&[("100", "1")], 2));
    timeout(WAIT, partitions.recv()).await.unwrap().unwrap();
    timeout(WAIT, h.reset.requested()).await.unwrap();

    // the crossed notification produced no data
    h.send(asks(&[("101", "1")], 3));
    let batch = h.next_batch().await;
    assert!(batch[0].payload.contains(r#""slot":3"#));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crossed_book_resubscribes_once() {
    let mut h = Harness::start();
    h.initialize().await;

    // stands in for the client: each request costs a few ms of reconnecting
    let resubscribes = Arc::new(AtomicUsize::new(0));
    let client = {
        let reset = h.reset.clone();
        let resubscribes = resubscribes.clone();
        tokio::spawn(async move {
            loop {
                reset.requested().await;
                resubscribes.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    h.send(bids(&[("100", "1")], 2));
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.abort();

    assert_eq!(resubscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn partition_elsewhere_resubscribes() {
    let mut h = Harness::start();
    h.initialize().await;

    h.bus.partition_detected.publish(());
    timeout(WAIT, h.reset.requested()).await.unwrap();
}

#[tokio::test]
async fn cleanup_stops_the_loop() {
    let mut h = Harness::start();
    h.initialize().await;

    h.bus.cleanup.publish(());
    let result = timeout(WAIT, h.task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn stream_end_stops_the_loop() {
    let h = Harness::start();
    drop(h.tx);

    let result = timeout(WAIT, h.task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn stream_errors_are_fatal() {
    let h = Harness::start();
    h.tx.send(Err(FeedError::StreamEnded)).unwrap();

    let result = timeout(WAIT, h.task).await.unwrap().unwrap();
    assert!(matches!(result, Err(FeedError::StreamEnded)));
}

#[tokio::test]
async fn undecodable_data_is_fatal() {
    let h = Harness::start();
    h.send(AccountsNotification {
        accounts_data: perp_book_feed::AccountsData {
            asks: Some(bytes::Bytes::from_static(b"not json")),
            bids: None,
        },
        slot: 1,
        reset: false,
    });

    let result = timeout(WAIT, h.task).await.unwrap().unwrap();
    assert!(matches!(result, Err(FeedError::ParseError(_))));
}
