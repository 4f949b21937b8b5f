//! Book side account decoding
//!
//! A Mango v3 `BookSide` account is a critbit tree stored in a fixed slab of
//! 88-byte nodes behind a 40-byte header. Leaves carry the resting orders;
//! walking the tree depth-first yields them best price first.

use bytes::Buf;
use rust_decimal::Decimal;

use super::{RestingOrder, Side};
use crate::error::{FeedError, Result};
use crate::market::MarketMeta;

const META_DATA_LEN: usize = 8;
const HEADER_LEN: usize = 40;
const NODE_SIZE: usize = 88;

/// Number of nodes in a book side slab
pub const MAX_BOOK_NODES: usize = 1024;
/// Size in bytes of a book side account
pub const BOOK_SIDE_LEN: usize = HEADER_LEN + NODE_SIZE * MAX_BOOK_NODES;

const DATA_TYPE_BIDS: u8 = 5;
const DATA_TYPE_ASKS: u8 = 6;

const TAG_INNER: u32 = 1;
const TAG_LEAF: u32 = 2;

/// Turns a raw book side account into resting orders, best price first
#[cfg_attr(test, mockall::automock)]
pub trait BookSideDecoder: Send {
    fn decode(&self, side: Side, data: &[u8]) -> Result<Vec<RestingOrder>>;
}

/// Decoder for the Mango v3 `BookSide` slab layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabDecoder {
    /// UI price of one price lot
    price_lot: Decimal,
    /// UI size of one base lot
    base_lot: Decimal,
}

impl SlabDecoder {
    pub fn new(price_lot: Decimal, base_lot: Decimal) -> Self {
        Self {
            price_lot,
            base_lot,
        }
    }

    pub fn for_market(market: &MarketMeta) -> Result<Self> {
        Ok(Self::new(market.tick_size()?, market.min_order_size()?))
    }

    /// Decode with an explicit clock (unix seconds) for expiry checks
    pub fn decode_at(&self, side: Side, data: &[u8], now: u64) -> Result<Vec<RestingOrder>> {
        if data.len() < HEADER_LEN {
            return Err(FeedError::DecodeError(format!(
                "book side account too short: {} bytes",
                data.len()
            )));
        }

        let expected = match side {
            Side::Bid => DATA_TYPE_BIDS,
            Side::Ask => DATA_TYPE_ASKS,
        };
        if data[0] != expected {
            return Err(FeedError::DecodeError(format!(
                "expected {} account (data type {}), got data type {}",
                side.as_str(),
                expected,
                data[0]
            )));
        }

        let mut header = &data[META_DATA_LEN..HEADER_LEN];
        let _bump_index = header.get_u64_le();
        let _free_list_len = header.get_u64_le();
        let _free_list_head = header.get_u32_le();
        let root = header.get_u32_le();
        let leaf_count = header.get_u64_le();

        if leaf_count == 0 {
            return Ok(Vec::new());
        }

        // bids walk the higher child first
        let (first, second) = match side {
            Side::Bid => (1, 0),
            Side::Ask => (0, 1),
        };

        let mut orders = Vec::with_capacity((leaf_count as usize).min(MAX_BOOK_NODES));
        let mut stack = vec![root];
        let mut visited = 0usize;

        while let Some(handle) = stack.pop() {
            visited += 1;
            if visited > MAX_BOOK_NODES {
                return Err(FeedError::DecodeError(
                    "critbit tree visits more nodes than the slab holds".to_string(),
                ));
            }

            let node = node_at(data, handle)?;
            match (&node[..4]).get_u32_le() {
                TAG_INNER => {
                    let mut children = &node[24..32];
                    let children = [children.get_u32_le(), children.get_u32_le()];
                    stack.push(children[second]);
                    stack.push(children[first]);
                }
                TAG_LEAF => {
                    if let Some(order) = self.leaf(node, side, now)? {
                        orders.push(order);
                    }
                }
                tag => {
                    return Err(FeedError::DecodeError(format!(
                        "unexpected node tag {} at handle {}",
                        tag, handle
                    )));
                }
            }
        }

        Ok(orders)
    }

    fn leaf(&self, node: &[u8], side: Side, now: u64) -> Result<Option<RestingOrder>> {
        let mut body = &node[4..];
        let owner_slot = body.get_u8();
        let _order_type = body.get_u8();
        let _version = body.get_u8();
        let time_in_force = body.get_u8();
        let key = body.get_u128_le();
        let mut owner = [0u8; 32];
        body.copy_to_slice(&mut owner);
        let quantity = body.get_i64_le();
        let client_order_id = body.get_u64_le();
        let _best_initial = body.get_i64_le();
        let timestamp = body.get_u64_le();

        if time_in_force > 0 && timestamp.saturating_add(time_in_force as u64) <= now {
            return Ok(None);
        }

        let price_lots = (key >> 64) as i64;
        let price = Decimal::from(price_lots)
            .checked_mul(self.price_lot)
            .ok_or_else(|| FeedError::DecodeError(format!("price overflow: {} lots", price_lots)))?;
        let size = Decimal::from(quantity)
            .checked_mul(self.base_lot)
            .ok_or_else(|| FeedError::DecodeError(format!("size overflow: {} lots", quantity)))?;

        Ok(Some(RestingOrder {
            order_id: key.to_string(),
            client_id: if client_order_id == 0 {
                String::new()
            } else {
                client_order_id.to_string()
            },
            owner: bs58::encode(owner).into_string(),
            price,
            size,
            account_slot: owner_slot,
            side,
        }))
    }
}

impl BookSideDecoder for SlabDecoder {
    fn decode(&self, side: Side, data: &[u8]) -> Result<Vec<RestingOrder>> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.decode_at(side, data, now)
    }
}

fn node_at(data: &[u8], handle: u32) -> Result<&[u8]> {
    let index = handle as usize;
    let offset = HEADER_LEN + index * NODE_SIZE;
    if index >= MAX_BOOK_NODES || offset + NODE_SIZE > data.len() {
        return Err(FeedError::DecodeError(format!(
            "node handle {} out of range",
            handle
        )));
    }
    Ok(&data[offset..offset + NODE_SIZE])
}
