//! Price level formatting, aggregation and diffing

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{HashMap, HashSet};

use super::{PriceLevel, RestingOrder, Side};

/// Number of fractional digits needed to represent `value` exactly
/// (`0.01` -> 2, `0.5` -> 1, `1` -> 0).
pub fn decimal_places(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Formats prices and sizes to a market's fixed decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCodec {
    price_decimal_places: u32,
    size_decimal_places: u32,
}

impl LevelCodec {
    pub fn new(price_decimal_places: u32, size_decimal_places: u32) -> Self {
        Self {
            price_decimal_places,
            size_decimal_places,
        }
    }

    pub fn price_decimal_places(&self) -> u32 {
        self.price_decimal_places
    }

    pub fn size_decimal_places(&self) -> u32 {
        self.size_decimal_places
    }

    pub fn format_price(&self, price: Decimal) -> Decimal {
        fixed(price, self.price_decimal_places)
    }

    pub fn format_size(&self, size: Decimal) -> Decimal {
        fixed(size, self.size_decimal_places)
    }

    /// Size value marking a removed level, e.g. `0.0000`
    pub fn zero_size(&self) -> Decimal {
        fixed(Decimal::ZERO, self.size_decimal_places)
    }

    pub fn level(&self, price: Decimal, size: Decimal) -> PriceLevel {
        PriceLevel::new(self.format_price(price), self.format_size(size))
    }

    /// Collapse adjacent orders sharing the same formatted price into one
    /// level holding their summed size.
    ///
    /// Orders must already be in side-natural order, as produced by the decoder.
    pub fn levels(&self, orders: &[RestingOrder]) -> Vec<PriceLevel> {
        let mut runs: Vec<(Decimal, Decimal)> = Vec::new();

        for order in orders {
            let price = self.format_price(order.price);
            match runs.last_mut() {
                Some((last_price, size)) if *last_price == price => *size += order.size,
                _ => runs.push((price, order.size)),
            }
        }

        runs.into_iter()
            .map(|(price, size)| PriceLevel::new(price, self.format_size(size)))
            .collect()
    }

    /// Diff between two snapshots of one side, see [`level_diff`].
    pub fn diff(&self, old: &[PriceLevel], new: &[PriceLevel]) -> Vec<PriceLevel> {
        level_diff(old, new, self.zero_size())
    }
}

/// Round half away from zero, then pad to exactly `decimal_places` digits.
fn fixed(value: Decimal, decimal_places: u32) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(decimal_places);
    rounded
}

/// Minimal set of level changes turning `old` into `new`.
///
/// Removed prices come first as `zero_size` levels, in reverse order of
/// `old`. They are followed by new or resized levels in the order of `new`.
pub fn level_diff(old: &[PriceLevel], new: &[PriceLevel], zero_size: Decimal) -> Vec<PriceLevel> {
    let previous: HashMap<Decimal, Decimal> =
        old.iter().map(|level| (level.price(), level.size())).collect();
    let current: HashSet<Decimal> = new.iter().map(|level| level.price()).collect();

    let removed = old
        .iter()
        .rev()
        .filter(|level| !current.contains(&level.price()))
        .map(|level| PriceLevel::new(level.price(), zero_size));

    let changed = new
        .iter()
        .filter(|level| previous.get(&level.price()) != Some(&level.size()))
        .copied();

    removed.chain(changed).collect()
}

/// Merge a diff into one side: replace or insert on matching price, drop
/// zero-size levels, keep side-natural order.
pub fn apply_diff(levels: &[PriceLevel], diff: &[PriceLevel], side: Side) -> Vec<PriceLevel> {
    let mut merged = levels.to_vec();

    for change in diff {
        let position =
            merged.binary_search_by(|level| side.cmp_prices(&level.price(), &change.price()));
        match position {
            Ok(index) if change.is_deletion() => {
                merged.remove(index);
            }
            Ok(index) => merged[index] = *change,
            Err(_) if change.is_deletion() => {}
            Err(index) => merged.insert(index, *change),
        }
    }

    merged
}
