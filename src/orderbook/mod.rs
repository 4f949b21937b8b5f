//! Order book module
//!
//! Reconstructs L2 book state from decoded book side accounts and turns
//! every account change into snapshot, diff and quote messages.

pub mod codec;
pub mod decoder;
mod engine;

pub use codec::{apply_diff, decimal_places, level_diff, LevelCodec};
pub use decoder::{BookSideDecoder, SlabDecoder};
pub use engine::{EngineOptions, OrderBookEngine, PartitionHook};

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::str::FromStr;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Compare two prices in side-natural order (best price first)
    pub fn cmp_prices(self, a: &Decimal, b: &Decimal) -> Ordering {
        match self {
            Side::Bid => b.cmp(a),
            Side::Ask => a.cmp(b),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Bid => "bids",
            Side::Ask => "asks",
        }
    }
}

/// A single aggregated level, already rounded to the market precision.
///
/// Serialized as a two-element array of fixed-decimal strings,
/// e.g. `["100.00","1.0000"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel {
    price: Decimal,
    size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    /// A zero-size level tells consumers to drop the price.
    pub fn is_deletion(&self) -> bool {
        self.size.is_zero()
    }
}

impl Serialize for PriceLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.price.to_string())?;
        tuple.serialize_element(&self.size.to_string())?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (price, size): (String, String) = Deserialize::deserialize(deserializer)?;
        Ok(Self {
            price: Decimal::from_str(&price).map_err(D::Error::custom)?,
            size: Decimal::from_str(&size).map_err(D::Error::custom)?,
        })
    }
}

/// A resting order decoded from a book side account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestingOrder {
    pub order_id: String,
    pub client_id: String,
    pub owner: String,
    pub price: Decimal,
    pub size: Decimal,
    pub account_slot: u8,
    pub side: Side,
}

/// Full L2 state of both sides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSnapshot {
    /// Asks sorted by price ascending (lowest first)
    pub asks: Vec<PriceLevel>,
    /// Bids sorted by price descending (highest first)
    pub bids: Vec<PriceLevel>,
}

impl BookSnapshot {
    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Best level of each side
    pub fn quote(&self) -> Quote {
        Quote {
            best_ask: self.asks.first().copied(),
            best_bid: self.bids.first().copied(),
        }
    }

    /// Best bid at or above best ask. Only meaningful when both sides have levels.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }
}

/// Best bid and ask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quote {
    pub best_ask: Option<PriceLevel>,
    pub best_bid: Option<PriceLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_level_serializes_as_string_pair() {
        let level = PriceLevel::new(dec!(100.00), dec!(1.0000));
        assert_eq!(
            serde_json::to_string(&level).unwrap(),
            r#"["100.00","1.0000"]"#
        );

        let parsed: PriceLevel = serde_json::from_str(r#"["99.50","0.5000"]"#).unwrap();
        assert_eq!(parsed.price(), dec!(99.5));
        assert_eq!(parsed.size(), dec!(0.5));
    }

    #[test]
    fn test_crossed_detection() {
        let mut snapshot = BookSnapshot {
            asks: vec![PriceLevel::new(dec!(100), dec!(1))],
            bids: vec![PriceLevel::new(dec!(99), dec!(1))],
        };
        assert!(!snapshot.is_crossed());

        snapshot.bids.insert(0, PriceLevel::new(dec!(100), dec!(2)));
        assert!(snapshot.is_crossed());

        snapshot.asks.clear();
        assert!(!snapshot.is_crossed());
    }

    #[test]
    fn test_side_natural_ordering() {
        assert_eq!(Side::Bid.cmp_prices(&dec!(101), &dec!(100)), Ordering::Less);
        assert_eq!(Side::Ask.cmp_prices(&dec!(101), &dec!(100)), Ordering::Greater);
    }
}
