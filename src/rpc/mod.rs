//! Solana RPC account streaming
//!
//! The feed loop only sees [`AccountsStream`]: a source of book side account
//! updates that can be asked to resubscribe from scratch.

mod client;

pub use client::{RpcClient, RpcClientConfig};

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::Result;

/// Raw account data of the sides that changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsData {
    pub asks: Option<Bytes>,
    pub bids: Option<Bytes>,
}

/// One change on the market's book side accounts.
///
/// `reset = true` notifications carry no data: they tell the consumer that
/// the stream restarted and a fresh snapshot follows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsNotification {
    pub accounts_data: AccountsData,
    pub slot: u64,
    pub reset: bool,
}

impl AccountsNotification {
    pub fn reset() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }
}

/// Requests a resubscribe on the stream it was taken from.
///
/// Requests made before the stream gets to them collapse into one.
#[derive(Debug, Clone, Default)]
pub struct ResetHandle(Arc<Notify>);

impl ResetHandle {
    pub fn reset(&self) {
        self.0.notify_one();
    }

    /// Resolves once a reset has been requested
    pub async fn requested(&self) {
        self.0.notified().await;
    }
}

/// Source of book side account notifications for one market
pub trait AccountsStream: Send {
    /// Next notification, `Ok(None)` once the stream is exhausted
    fn next_notification(
        &mut self,
    ) -> impl Future<Output = Result<Option<AccountsNotification>>> + Send;

    fn reset_handle(&self) -> ResetHandle;
}
