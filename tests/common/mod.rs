//! Shared helpers for integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use perp_book_feed::error::Result;
use perp_book_feed::{AccountsData, AccountsNotification, BookSideDecoder, MarketMeta, RestingOrder, Side};
use rust_decimal::Decimal;

/// Decodes side data written as a JSON array of `[price, size]` pairs,
/// already in side-natural order.
pub struct JsonDecoder;

impl BookSideDecoder for JsonDecoder {
    fn decode(&self, side: Side, data: &[u8]) -> Result<Vec<RestingOrder>> {
        let levels: Vec<(Decimal, Decimal)> = serde_json::from_slice(data)?;
        Ok(levels
            .into_iter()
            .enumerate()
            .map(|(i, (price, size))| RestingOrder {
                order_id: i.to_string(),
                client_id: String::new(),
                owner: "owner".to_string(),
                price,
                size,
                account_slot: 0,
                side,
            })
            .collect())
    }
}

/// Encode `(price, size)` pairs for [`JsonDecoder`]
pub fn side_data(levels: &[(&str, &str)]) -> Bytes {
    let pairs: Vec<[&str; 2]> = levels.iter().map(|(p, s)| [*p, *s]).collect();
    Bytes::from(serde_json::to_vec(&pairs).unwrap())
}

pub fn notification(
    asks: Option<&[(&str, &str)]>,
    bids: Option<&[(&str, &str)]>,
    slot: u64,
) -> AccountsNotification {
    AccountsNotification {
        accounts_data: AccountsData {
            asks: asks.map(side_data),
            bids: bids.map(side_data),
        },
        slot,
        reset: false,
    }
}

pub fn asks(levels: &[(&str, &str)], slot: u64) -> AccountsNotification {
    notification(Some(levels), None, slot)
}

pub fn bids(levels: &[(&str, &str)], slot: u64) -> AccountsNotification {
    notification(None, Some(levels), slot)
}

/// Market with tick 0.01 and minimum size 0.0001
pub fn market() -> MarketMeta {
    MarketMeta {
        name: "BTC-PERP".to_string(),
        address: "market-btc".to_string(),
        program_id: "program".to_string(),
        bids: "bids-btc".to_string(),
        asks: "asks-btc".to_string(),
        base_decimals: 6,
        quote_decimals: 6,
        base_lot_size: 100,
        quote_lot_size: 1,
    }
}
