use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::Side;

/// An executed trade between two orders.
///
/// - The price comes from the maker's order (i.e. the resting order).
/// - `aggressor_side` is the side of the incoming order that triggered it.
/// - Immutable once created; the engine appends it to its trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub aggressor_side: Side,
    pub maker_order_id: Uuid,
    pub taker_order_id: Uuid,
}

impl Trade {
    pub fn new(
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
        aggressor_side: Side,
        maker_order_id: Uuid,
        taker_order_id: Uuid,
    ) -> Trade {
        Trade {
            trade_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            price,
            quantity,
            timestamp: Utc::now(),
            aggressor_side,
            maker_order_id,
            taker_order_id,
        }
    }
}
