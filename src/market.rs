//! Market metadata and the market catalog
//!
//! Lot sizes and token decimals determine the UI value of one price lot
//! (tick size) and one base lot (minimum order size), which in turn fix the
//! decimal places every emitted price and size is rendered with.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{FeedError, Result};
use crate::orderbook::{decimal_places, LevelCodec};

/// Perp market definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMeta {
    /// Market symbol (e.g., "BTC-PERP")
    pub name: String,
    /// Perp market account
    pub address: String,
    pub program_id: String,
    /// Bids book side account
    pub bids: String,
    /// Asks book side account
    pub asks: String,
    pub base_decimals: u32,
    pub quote_decimals: u32,
    pub base_lot_size: i64,
    pub quote_lot_size: i64,
}

impl MarketMeta {
    /// UI price of one price lot
    pub fn tick_size(&self) -> Result<Decimal> {
        let quote = self.ui_lot(self.quote_lot_size, self.quote_decimals)?;
        let base = self.ui_lot(self.base_lot_size, self.base_decimals)?;
        quote
            .checked_div(base)
            .map(|tick| tick.normalize())
            .ok_or_else(|| FeedError::ConfigError(format!("{}: invalid tick size", self.name)))
    }

    /// UI size of one base lot
    pub fn min_order_size(&self) -> Result<Decimal> {
        Ok(self
            .ui_lot(self.base_lot_size, self.base_decimals)?
            .normalize())
    }

    /// Codec rendering prices and sizes with this market's decimal places
    pub fn codec(&self) -> Result<LevelCodec> {
        Ok(LevelCodec::new(
            decimal_places(self.tick_size()?),
            decimal_places(self.min_order_size()?),
        ))
    }

    fn ui_lot(&self, lot_size: i64, decimals: u32) -> Result<Decimal> {
        if lot_size <= 0 {
            return Err(FeedError::ConfigError(format!(
                "{}: lot size must be positive, got {}",
                self.name, lot_size
            )));
        }
        if decimals > 28 {
            return Err(FeedError::ConfigError(format!(
                "{}: unsupported token decimals {}",
                self.name, decimals
            )));
        }
        Ok(Decimal::from_i128_with_scale(lot_size as i128, decimals))
    }
}

/// Markets available to serve
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketCatalog {
    pub markets: Vec<MarketMeta>,
}

impl MarketCatalog {
    /// Load the catalog from a JSON or TOML file (format picked by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let catalog: MarketCatalog = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;

        let catalog = catalog.dedup();
        for market in &catalog.markets {
            market.codec()?;
        }

        info!(
            path = %path.display(),
            markets = catalog.markets.len(),
            "Market catalog loaded"
        );
        Ok(catalog)
    }

    fn dedup(self) -> Self {
        let mut seen = HashSet::new();
        let markets = self
            .markets
            .into_iter()
            .filter(|market| {
                let first = seen.insert(market.name.clone());
                if !first {
                    warn!(market = %market.name, "Duplicate market in catalog, keeping the first");
                }
                first
            })
            .collect();
        Self { markets }
    }

    pub fn names(&self) -> Vec<&str> {
        self.markets.iter().map(|m| m.name.as_str()).collect()
    }

    /// Resolve market names; an empty selection means every market
    pub fn select(&self, names: &[String]) -> Result<Vec<MarketMeta>> {
        if names.is_empty() {
            return Ok(self.markets.clone());
        }

        let known = self.names();
        names
            .iter()
            .map(|name| {
                self.markets
                    .iter()
                    .find(|m| &m.name == name)
                    .cloned()
                    .ok_or_else(|| FeedError::UnknownMarket {
                        name: name.clone(),
                        tip: did_you_mean(name, &known)
                            .map(|closest| format!(" Did you mean '{}'?", closest))
                            .unwrap_or_default(),
                        allowed: known
                            .iter()
                            .map(|n| format!("'{}'", n))
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            })
            .collect()
    }
}

/// Minimum case-insensitive similarity for a name to be suggested
const SUGGESTION_THRESHOLD: f64 = 0.4;

/// Most similar candidate, first one on ties
fn did_you_mean<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input = input.to_lowercase();
    candidates
        .iter()
        .rev()
        .map(|&candidate| {
            let score = strsim::normalized_levenshtein(&input, &candidate.to_lowercase());
            (candidate, score)
        })
        .filter(|&(_, score)| score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::btc_perp;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_derived_precisions() {
        let market = btc_perp();
        assert_eq!(market.tick_size().unwrap(), dec!(0.1));
        assert_eq!(market.min_order_size().unwrap(), dec!(0.0001));

        let codec = market.codec().unwrap();
        assert_eq!(codec.price_decimal_places(), 1);
        assert_eq!(codec.size_decimal_places(), 4);
    }

    #[test]
    fn test_mixed_decimals() {
        let market = MarketMeta {
            name: "SOL-PERP".to_string(),
            base_decimals: 9,
            quote_decimals: 6,
            base_lot_size: 10_000_000,
            quote_lot_size: 100,
            ..btc_perp()
        };
        assert_eq!(market.tick_size().unwrap(), dec!(0.01));
        assert_eq!(market.min_order_size().unwrap(), dec!(0.01));
    }

    #[test]
    fn test_invalid_lot_size() {
        let market = MarketMeta {
            base_lot_size: 0,
            ..btc_perp()
        };
        assert!(matches!(market.tick_size(), Err(FeedError::ConfigError(_))));
    }

    #[test]
    fn test_load_and_select() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markets.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"markets": [
                {{"name": "BTC-PERP", "address": "market-btc", "program_id": "program",
                  "bids": "bids-btc", "asks": "asks-btc", "base_decimals": 6,
                  "quote_decimals": 6, "base_lot_size": 100, "quote_lot_size": 10}},
                {{"name": "BTC-PERP", "address": "dup", "program_id": "program",
                  "bids": "dup", "asks": "dup", "base_decimals": 6,
                  "quote_decimals": 6, "base_lot_size": 100, "quote_lot_size": 10}}
            ]}}"#
        )
        .unwrap();

        let catalog = MarketCatalog::load(&path).unwrap();
        assert_eq!(catalog.markets, vec![btc_perp()]);

        assert_eq!(catalog.select(&[]).unwrap().len(), 1);
        assert_eq!(catalog.select(&["BTC-PERP".to_string()]).unwrap()[0].bids, "bids-btc");

        let err = catalog.select(&["ETH-PERP".to_string()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown market 'ETH-PERP'. Did you mean 'BTC-PERP'? Allowed values: 'BTC-PERP'."
        );

        let err = catalog.select(&["DOGE".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown market 'DOGE'. Allowed values: 'BTC-PERP'.");
    }

    #[test]
    fn test_did_you_mean() {
        let names = ["BTC-PERP", "SOL-PERP", "ETH-PERP"];

        assert_eq!(did_you_mean("sol-perp", &names), Some("SOL-PERP"));
        assert_eq!(did_you_mean("SOL-PRP", &names), Some("SOL-PERP"));
        assert_eq!(did_you_mean("ETHPERP", &names), Some("ETH-PERP"));
        // equally close to all three
        assert_eq!(did_you_mean("XXX-PERP", &names), Some("BTC-PERP"));
        assert_eq!(did_you_mean("AVAX", &names), None);
        assert_eq!(did_you_mean("BTC", &[]), None);
    }
}
