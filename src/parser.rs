//! Parser module for Solana JSON-RPC messages
//!
//! Handles subscription confirmations, account notifications, error
//! responses and `getMultipleAccounts` results.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer};

use crate::error::{FeedError, Result};

/// Slot context attached to RPC results
#[derive(Debug, Clone, Deserialize)]
pub struct RpcContext {
    pub slot: u64,
}

/// Result value paired with the slot it was observed at
#[derive(Debug, Clone, Deserialize)]
pub struct Contextual<T> {
    pub context: RpcContext,
    pub value: T,
}

/// Account as returned with `encoding: base64`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    /// Decoded account data
    #[serde(deserialize_with = "deserialize_account_data")]
    pub data: Bytes,

    /// Owning program
    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub lamports: u64,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct NotificationParams {
    result: Contextual<AccountInfo>,
    subscription: u64,
}

/// Raw JSON-RPC frame, either a response or a notification
#[derive(Debug, Clone, Deserialize)]
struct RpcFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    /// Response to an `accountSubscribe` request
    SubscriptionConfirmed { request_id: u64, subscription: u64 },
    AccountNotification {
        subscription: u64,
        slot: u64,
        data: Bytes,
    },
    Error {
        request_id: Option<u64>,
        code: i64,
        message: String,
    },
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        let frame: RpcFrame = serde_json::from_str(raw)?;

        if let Some(error) = frame.error {
            return Ok(ParsedMessage::Error {
                request_id: frame.id,
                code: error.code,
                message: error.message,
            });
        }

        if frame.method.as_deref() == Some("accountNotification") {
            if let Some(params) = frame.params {
                let params: NotificationParams = serde_json::from_value(params)?;
                return Ok(ParsedMessage::AccountNotification {
                    subscription: params.subscription,
                    slot: params.result.context.slot,
                    data: params.result.value.data,
                });
            }
        }

        if let (Some(request_id), Some(subscription)) =
            (frame.id, frame.result.as_ref().and_then(|r| r.as_u64()))
        {
            return Ok(ParsedMessage::SubscriptionConfirmed {
                request_id,
                subscription,
            });
        }

        Ok(ParsedMessage::Unknown(raw.to_string()))
    }
}

/// `getMultipleAccounts` response
#[derive(Debug, Clone, Deserialize)]
struct MultipleAccountsResponse {
    #[serde(default)]
    result: Option<Contextual<Vec<Option<AccountInfo>>>>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Accounts fetched in one request, in request order
#[derive(Debug, Clone)]
pub struct MultipleAccounts {
    pub slot: u64,
    /// `None` for accounts that do not exist
    pub accounts: Vec<Option<Bytes>>,
}

/// Parse a `getMultipleAccounts` HTTP response body
pub fn parse_multiple_accounts(raw: &str) -> Result<MultipleAccounts> {
    let response: MultipleAccountsResponse = serde_json::from_str(raw)?;

    if let Some(error) = response.error {
        return Err(FeedError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    let result = response
        .result
        .ok_or_else(|| FeedError::ParseError("getMultipleAccounts: missing result".to_string()))?;

    Ok(MultipleAccounts {
        slot: result.context.slot,
        accounts: result
            .value
            .into_iter()
            .map(|account| account.map(|a| a.data))
            .collect(),
    })
}

/// Custom deserializer for `[data, "base64"]` account data
fn deserialize_account_data<'de, D>(deserializer: D) -> std::result::Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let (data, encoding): (String, String) = Deserialize::deserialize(deserializer)?;
    if encoding != "base64" {
        return Err(serde::de::Error::custom(format!(
            "unsupported account encoding: {}",
            encoding
        )));
    }
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}
