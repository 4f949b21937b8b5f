//! WebSocket + HTTP RPC client for one market's book side accounts
//!
//! Subscribes to both accounts over WebSocket, then fetches both over HTTP
//! so the first notification always carries a complete book.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

use super::{AccountsData, AccountsNotification, AccountsStream, ResetHandle};
use crate::error::{FeedError, Result};
use crate::market::MarketMeta;
use crate::parser::{parse_multiple_accounts, ParsedMessage};
use crate::retry::execute_and_retry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const BIDS_REQUEST_ID: u64 = 1;
const ASKS_REQUEST_ID: u64 = 2;

/// Connection settings shared by every market's client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// HTTP JSON-RPC endpoint
    pub http_endpoint: String,
    pub ws_endpoint: String,
    pub commitment: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// A connection silent for this long is considered lost
    pub recv_timeout: Duration,
}

#[derive(Debug, Clone)]
struct BookAccounts {
    market: String,
    bids: String,
    asks: String,
}

struct Connection {
    ws: WsStream,
    bids_subscription: u64,
    asks_subscription: u64,
    bids_slot: u64,
    asks_slot: u64,
}

enum Event {
    ResetRequested,
    Message(Message),
    Lost(String),
}

/// Book side account stream backed by a Solana RPC node
pub struct RpcClient {
    config: RpcClientConfig,
    accounts: BookAccounts,
    http: reqwest::Client,
    connection: Option<Connection>,
    pending: VecDeque<AccountsNotification>,
    reset: ResetHandle,
    connected_once: bool,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig, market: &MarketMeta) -> Self {
        Self {
            config,
            accounts: BookAccounts {
                market: market.name.clone(),
                bids: market.bids.clone(),
                asks: market.asks.clone(),
            },
            http: reqwest::Client::new(),
            connection: None,
            pending: VecDeque::new(),
            reset: ResetHandle::default(),
            connected_once: false,
        }
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// (Re)connect with retries and queue the fresh snapshot
    async fn reconnect(&mut self) -> Result<()> {
        let config = &self.config;
        let accounts = &self.accounts;
        let http = &self.http;

        let (connection, snapshot) = execute_and_retry(
            move |attempt| connect_once(config, accounts, http, attempt),
            config.max_retries,
            config.retry_base_delay,
        )
        .await?;

        if self.connected_once {
            self.pending.push_back(AccountsNotification::reset());
        }
        self.pending.push_back(snapshot);
        self.connection = Some(connection);
        self.connected_once = true;

        Ok(())
    }

    async fn disconnect(&mut self, graceful: bool) {
        if let Some(mut connection) = self.connection.take() {
            if graceful {
                let _ = connection.ws.close(None).await;
            }
        }
    }

    async fn next_event(&mut self) -> Result<Event> {
        let reset = self.reset.clone();
        let recv_timeout = self.config.recv_timeout;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| FeedError::WebSocketConnection("Not connected".to_string()))?;

        let event = tokio::select! {
            _ = reset.requested() => Event::ResetRequested,
            received = timeout(recv_timeout, connection.ws.next()) => match received {
                Ok(Some(Ok(message))) => Event::Message(message),
                Ok(Some(Err(e))) => Event::Lost(e.to_string()),
                Ok(None) => Event::Lost(FeedError::StreamEnded.to_string()),
                Err(_) => Event::Lost(FeedError::ConnectionTimeout.to_string()),
            },
        };

        Ok(event)
    }

    async fn handle_message(&mut self, message: Message) -> Result<()> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8_lossy(&data).to_string(),
            Message::Ping(data) => {
                trace!("Received ping, sending pong");
                if let Some(connection) = self.connection.as_mut() {
                    if let Err(e) = connection.ws.send(Message::Pong(data)).await {
                        warn!(market = %self.accounts.market, error = %e, "Failed to send pong");
                    }
                }
                return Ok(());
            }
            Message::Pong(_) | Message::Frame(_) => return Ok(()),
            Message::Close(frame) => {
                warn!(market = %self.accounts.market, frame = ?frame, "Received close frame");
                self.disconnect(false).await;
                return Ok(());
            }
        };

        match ParsedMessage::parse(&text) {
            Ok(ParsedMessage::AccountNotification {
                subscription,
                slot,
                data,
            }) => self.on_account_notification(subscription, slot, data),
            Ok(ParsedMessage::Error { code, message, .. }) => {
                warn!(
                    market = %self.accounts.market,
                    code,
                    message = %message,
                    "RPC error on subscription, resubscribing"
                );
                self.disconnect(true).await;
            }
            Ok(other) => trace!(message = ?other, "Ignoring RPC message"),
            Err(e) => warn!(market = %self.accounts.market, error = %e, "Failed to parse RPC message"),
        }

        Ok(())
    }

    fn on_account_notification(&mut self, subscription: u64, slot: u64, data: bytes::Bytes) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        let mut accounts_data = AccountsData::default();
        let last_slot = if subscription == connection.bids_subscription {
            accounts_data.bids = Some(data);
            &mut connection.bids_slot
        } else if subscription == connection.asks_subscription {
            accounts_data.asks = Some(data);
            &mut connection.asks_slot
        } else {
            trace!(subscription, "Notification for unknown subscription");
            return;
        };

        if slot < *last_slot {
            debug!(
                market = %self.accounts.market,
                slot,
                last_slot = *last_slot,
                "Dropping stale account notification"
            );
            return;
        }
        *last_slot = slot;

        self.pending.push_back(AccountsNotification {
            accounts_data,
            slot,
            reset: false,
        });
    }
}

impl AccountsStream for RpcClient {
    async fn next_notification(&mut self) -> Result<Option<AccountsNotification>> {
        loop {
            if let Some(notification) = self.pending.pop_front() {
                return Ok(Some(notification));
            }

            if self.connection.is_none() {
                self.reconnect().await?;
                continue;
            }

            match self.next_event().await? {
                Event::ResetRequested => {
                    info!(market = %self.accounts.market, "Resubscribing on request");
                    self.disconnect(true).await;
                }
                Event::Lost(reason) => {
                    warn!(market = %self.accounts.market, reason = %reason, "Connection lost, reconnecting");
                    self.disconnect(false).await;
                }
                Event::Message(message) => self.handle_message(message).await?,
            }
        }
    }

    fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }
}

fn subscribe_request(id: u64, account: &str, commitment: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "accountSubscribe",
        "params": [account, {"encoding": "base64", "commitment": commitment}],
    })
    .to_string()
}

/// One connect attempt: subscribe to both sides, then fetch their current state
async fn connect_once(
    config: &RpcClientConfig,
    accounts: &BookAccounts,
    http: &reqwest::Client,
    attempt: u32,
) -> Result<(Connection, AccountsNotification)> {
    info!(
        market = %accounts.market,
        url = %config.ws_endpoint,
        attempt,
        "Connecting to RPC WebSocket"
    );

    let (mut ws, response) = connect_async(config.ws_endpoint.as_str())
        .await
        .map_err(|e| FeedError::WebSocketConnection(format!("Failed to connect: {}", e)))?;
    debug!(status = ?response.status(), "WebSocket connected");

    ws.send(Message::Text(subscribe_request(
        BIDS_REQUEST_ID,
        &accounts.bids,
        &config.commitment,
    )))
    .await?;
    ws.send(Message::Text(subscribe_request(
        ASKS_REQUEST_ID,
        &accounts.asks,
        &config.commitment,
    )))
    .await?;

    let mut bids_subscription = None;
    let mut asks_subscription = None;
    while bids_subscription.is_none() || asks_subscription.is_none() {
        let message = match timeout(config.recv_timeout, ws.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Err(FeedError::StreamEnded),
            Err(_) => return Err(FeedError::ConnectionTimeout),
        };
        let Message::Text(text) = message else {
            continue;
        };

        match ParsedMessage::parse(&text)? {
            ParsedMessage::SubscriptionConfirmed {
                request_id: BIDS_REQUEST_ID,
                subscription,
            } => bids_subscription = Some(subscription),
            ParsedMessage::SubscriptionConfirmed {
                request_id: ASKS_REQUEST_ID,
                subscription,
            } => asks_subscription = Some(subscription),
            ParsedMessage::Error { code, message, .. } => {
                return Err(FeedError::Rpc { code, message });
            }
            // the snapshot fetched below supersedes early notifications
            _ => {}
        }
    }

    let snapshot = fetch_accounts(config, accounts, http).await?;
    info!(
        market = %accounts.market,
        slot = snapshot.slot,
        "Subscribed to book side accounts"
    );

    let connection = Connection {
        ws,
        bids_subscription: bids_subscription.unwrap_or_default(),
        asks_subscription: asks_subscription.unwrap_or_default(),
        bids_slot: snapshot.slot,
        asks_slot: snapshot.slot,
    };
    Ok((connection, snapshot))
}

async fn fetch_accounts(
    config: &RpcClientConfig,
    accounts: &BookAccounts,
    http: &reqwest::Client,
) -> Result<AccountsNotification> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getMultipleAccounts",
        "params": [
            [accounts.bids, accounts.asks],
            {"encoding": "base64", "commitment": config.commitment},
        ],
    });

    let body = http
        .post(&config.http_endpoint)
        .json(&request)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let fetched = parse_multiple_accounts(&body)?;
    let mut data = fetched.accounts.into_iter();
    let (Some(Some(bids)), Some(Some(asks))) = (data.next(), data.next()) else {
        return Err(FeedError::ParseError(format!(
            "{}: book side accounts not found",
            accounts.market
        )));
    };

    Ok(AccountsNotification {
        accounts_data: AccountsData {
            asks: Some(asks),
            bids: Some(bids),
        },
        slot: fetched.slot,
        reset: false,
    })
}
