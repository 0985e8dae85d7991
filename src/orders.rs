use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,  //bid
    Sell, //ask
}

impl Side {
    /// The side an incoming order matches against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    /// Immediate-or-cancel: match what is available, cancel the rest.
    Ioc,
    /// Fill-or-kill: match the full quantity atomically or reject.
    Fok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

/// Payload for a new order submission. The HTTP layer deserializes straight
/// into this; `quantity` and `price` accept both JSON numbers and decimal
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// A single order owned by the engine.
///
/// `filled_quantity + remaining_quantity == quantity` holds at all times;
/// both fields are mutated only through [`Order::apply_fill`] under the
/// engine's write gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "order_id")]
    pub id: Uuid,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    /// Engine-assigned arrival sequence; ties within a price level resolve
    /// by this order. Not part of the wire snapshot.
    #[serde(skip)]
    pub seq: u64,
}

impl Order {
    /// Validates and creates a new order. The symbol is normalized to
    /// uppercase. `seq` comes from the engine and fixes arrival order.
    pub fn new(
        symbol: &str,
        order_type: OrderType,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        seq: u64,
    ) -> Result<Order, EngineError> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(
                "order quantity must be positive".into(),
            ));
        }
        match order_type {
            OrderType::Market => {
                if price.is_some() {
                    return Err(EngineError::InvalidOrder(
                        "market orders must not carry a price".into(),
                    ));
                }
            }
            OrderType::Limit | OrderType::Ioc | OrderType::Fok => match price {
                Some(p) if p > Decimal::ZERO => {}
                _ => {
                    return Err(EngineError::InvalidOrder(format!(
                        "{:?} orders require a positive price",
                        order_type
                    )));
                }
            },
        }
        Ok(Order {
            id: Uuid::new_v4(),
            symbol: symbol.to_uppercase(),
            order_type,
            side,
            quantity,
            price,
            timestamp: Utc::now(),
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: quantity,
            seq,
        })
    }

    /// Snapshot of an order that failed validation and never reached a book.
    pub fn rejected(req: &OrderRequest) -> Order {
        Order {
            id: Uuid::new_v4(),
            symbol: req.symbol.to_uppercase(),
            order_type: req.order_type,
            side: req.side,
            quantity: req.quantity,
            price: req.price,
            timestamp: Utc::now(),
            status: OrderStatus::Rejected,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: req.quantity,
            seq: 0,
        }
    }

    /// Moves `qty` from remaining to filled.
    pub fn apply_fill(&mut self, qty: Decimal) {
        debug_assert!(qty > Decimal::ZERO && qty <= self.remaining_quantity);
        self.remaining_quantity -= qty;
        self.filled_quantity += qty;
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_quantity.is_zero()
    }
}
