//! Configuration module for the book feed

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::rpc::RpcClientConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP JSON-RPC endpoint of the Solana node
    pub node_endpoint: String,

    /// WebSocket endpoint, derived from `node_endpoint` when unset
    pub ws_endpoint: Option<String>,

    /// Port override for the derived WebSocket endpoint
    pub ws_endpoint_port: Option<u16>,

    /// Commitment level for subscriptions and snapshots
    pub commitment: String,

    /// Market catalog file (JSON or TOML)
    pub markets_file: String,

    /// Markets to serve (e.g., ["BTC-PERP", "SOL-PERP"]); empty means all
    pub markets: Vec<String>,

    /// IPC socket path for publishing data
    pub ipc_socket_path: String,

    pub health_port: u16,

    /// Retry settings
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,

    /// Seconds without any message before the connection is considered lost
    pub recv_timeout_secs: u64,

    /// Broadcast capacity of every bus topic
    pub bus_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let markets: Vec<String> = env::var("MARKETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            node_endpoint: env::var("NODE_ENDPOINT")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
            ws_endpoint: env::var("WS_ENDPOINT").ok().filter(|s| !s.is_empty()),
            ws_endpoint_port: env::var("WS_ENDPOINT_PORT")
                .ok()
                .and_then(|p| p.parse().ok()),
            commitment: env::var("COMMITMENT").unwrap_or_else(|_| "confirmed".to_string()),
            markets_file: env::var("MARKETS_FILE").unwrap_or_else(|_| "markets.json".to_string()),
            markets,
            ipc_socket_path: env::var("IPC_SOCKET_PATH")
                .unwrap_or_else(|_| "/tmp/perp-book-feed.sock".to_string()),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            recv_timeout_secs: env::var("RECV_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            bus_capacity: env::var("BUS_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.bus_capacity > 0, "BUS_CAPACITY must be at least 1");
        anyhow::ensure!(self.recv_timeout_secs > 0, "RECV_TIMEOUT_SECS must be at least 1");
        Ok(())
    }

    /// WebSocket endpoint: explicit, or the node endpoint with its scheme
    /// swapped (`https` -> `wss`, `http` -> `ws`) and optional port override
    pub fn ws_endpoint(&self) -> String {
        if let Some(endpoint) = &self.ws_endpoint {
            return endpoint.clone();
        }

        let endpoint = if let Some(rest) = self.node_endpoint.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.node_endpoint.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.node_endpoint.clone()
        };

        match self.ws_endpoint_port {
            Some(port) => with_port(&endpoint, port),
            None => endpoint,
        }
    }

    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            http_endpoint: self.node_endpoint.clone(),
            ws_endpoint: self.ws_endpoint(),
            commitment: self.commitment.clone(),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            recv_timeout: Duration::from_secs(self.recv_timeout_secs),
        }
    }
}

/// Replace or add the port of `scheme://host[:port][/path]`
fn with_port(endpoint: &str, port: u16) -> String {
    let (scheme, rest) = endpoint.split_once("://").unwrap_or(("", endpoint));
    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };
    let host = authority
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(authority);

    if scheme.is_empty() {
        format!("{}:{}{}", host, port, path)
    } else {
        format!("{}://{}:{}{}", scheme, host, port, path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
            ws_endpoint: None,
            ws_endpoint_port: None,
            commitment: "confirmed".to_string(),
            markets_file: "markets.json".to_string(),
            markets: Vec::new(),
            ipc_socket_path: "/tmp/perp-book-feed.sock".to_string(),
            health_port: 9090,
            max_retries: 10,
            retry_base_delay_ms: 500,
            recv_timeout_secs: 60,
            bus_capacity: 1024,
        }
    }
}
