//! Error types for the book feed

use thiserror::Error;

/// Book feed errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Failed to decode book side: {0}")]
    DecodeError(String),

    #[error("Unknown market '{name}'.{tip} Allowed values: {allowed}.")]
    UnknownMarket {
        name: String,
        /// Empty, or ` Did you mean '...'?`
        tip: String,
        allowed: String,
    },

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Stream ended")]
    StreamEnded,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Http(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::IpcError(err.to_string())
    }
}

impl From<config::ConfigError> for FeedError {
    fn from(err: config::ConfigError) -> Self {
        FeedError::ConfigError(err.to_string())
    }
}

impl From<base64::DecodeError> for FeedError {
    fn from(err: base64::DecodeError) -> Self {
        FeedError::ParseError(format!("invalid base64 account data: {}", err))
    }
}

impl From<rmp_serde::encode::Error> for FeedError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        FeedError::SerializationError(err.to_string())
    }
}

impl From<prometheus::Error> for FeedError {
    fn from(err: prometheus::Error) -> Self {
        FeedError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_failures_have_their_own_variant() {
        let err = reqwest::Client::new()
            .post("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();

        let err = FeedError::from(err);
        assert!(matches!(err, FeedError::Http(_)));
        assert!(err.to_string().starts_with("HTTP request failed: "));
    }
}
