//! Shared test fixtures.

use crate::market::MarketMeta;
use crate::rpc::RpcClientConfig;
use std::time::Duration;

/// BTC-PERP with 6/6 decimals and lots 100/10: tick 0.1, min size 0.0001.
pub(crate) fn btc_perp() -> MarketMeta {
    MarketMeta {
        name: "BTC-PERP".to_string(),
        address: "market-btc".to_string(),
        program_id: "program".to_string(),
        bids: "bids-btc".to_string(),
        asks: "asks-btc".to_string(),
        base_decimals: 6,
        quote_decimals: 6,
        base_lot_size: 100,
        quote_lot_size: 10,
    }
}

/// RPC settings pointing at a closed local port, with near-zero backoff.
pub(crate) fn unreachable_rpc() -> RpcClientConfig {
    RpcClientConfig {
        http_endpoint: "http://127.0.0.1:9".to_string(),
        ws_endpoint: "ws://127.0.0.1:9".to_string(),
        commitment: "confirmed".to_string(),
        max_retries: 1,
        retry_base_delay: Duration::from_millis(1),
        recv_timeout: Duration::from_millis(100),
    }
}
