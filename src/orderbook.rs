use crate::orders::{Order, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

/// All resting orders at one price, in arrival (FIFO) order.
///
/// `total_quantity` is the sum of the remaining quantities of the queued
/// orders and is maintained incrementally at every mutation, including
/// partial fills of the head (the matching loop adjusts it per fill).
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub orders: VecDeque<Order>,
    pub total_quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    /// Appends an order to the tail of the queue.
    pub fn enqueue(&mut self, order: Order) {
        self.total_quantity += order.remaining_quantity;
        self.orders.push_back(order);
    }

    /// Front of the queue without removing it.
    pub fn peek_head(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Removes the front order. The caller has already zeroed its remaining
    /// quantity via fills, so the aggregate needs no adjustment here.
    pub fn pop_head(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    /// O(n) scan-and-remove, used for cancellation. Queues are short in
    /// practice and cancels are rare next to matches.
    pub fn remove(&mut self, order_id: &Uuid) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        let order = self.orders.remove(pos)?;
        self.total_quantity -= order.remaining_quantity;
        Some(order)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Point-in-time depth snapshot: the top N levels of each side as
/// `(price, total_quantity)` pairs, bids high-to-low, asks low-to-high.
/// Serializes as `[["price", "qty"], ...]` decimal-string pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDepth {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Best bid and offer for one symbol; fields are `None` when that side of
/// the book is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bbo {
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub spread: Option<Decimal>,
}

/// Per-symbol order book: two price-ordered sides plus an id index.
///
/// Both sides are ascending [`BTreeMap`]s; bids are iterated **in reverse**
/// to visit the highest price first, asks forwards for the lowest. Every
/// resting order is indexed by id with its `(side, price)` so cancellation
/// can locate its level without scanning the book.
pub struct OrderBook {
    pub symbol: String,
    bids: BTreeMap<Decimal, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    order_index: HashMap<Uuid, (Side, Decimal)>,
    last_update: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_index: HashMap::new(),
            last_update: Utc::now(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rests an order on its own side, creating the price level if absent,
    /// and indexes it by id. Market orders never rest; an order without a
    /// price is ignored with a warning.
    pub fn add_resting(&mut self, order: Order) {
        let Some(price) = order.price else {
            warn!(order_id = %order.id, "attempted to rest an order without a price; ignoring");
            return;
        };
        debug_assert!(order.remaining_quantity > Decimal::ZERO);
        debug!(order_id = %order.id, side = ?order.side, %price, "resting order");
        self.order_index.insert(order.id, (order.side, price));
        self.side_mut(order.side)
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .enqueue(order);
        self.last_update = Utc::now();
    }

    /// Removes an order by id: locates its level through the index, drops
    /// the level if it empties, and de-indexes. Returns `None` when the id
    /// is unknown (already filled, cancelled, or never rested).
    pub fn cancel(&mut self, order_id: &Uuid) -> Option<Order> {
        let (side, price) = self.order_index.remove(order_id)?;
        let book_side = self.side_mut(side);
        let level = book_side.get_mut(&price)?;
        let order = level.remove(order_id)?;
        if level.is_empty() {
            book_side.remove(&price);
        }
        self.last_update = Utc::now();
        debug!(%order_id, "removed order from book");
        Some(order)
    }

    /// Highest resting buy price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest resting sell price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Best price on the given side of the book.
    pub fn best_price(&self, side: Side) -> Option<Decimal> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    pub fn bbo(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.best_bid(), self.best_ask())
    }

    pub fn spread(&self) -> Option<Decimal> {
        match self.bbo() {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Top `levels` of each side as aggregate `(price, quantity)` pairs.
    pub fn depth(&self, levels: usize) -> BookDepth {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(levels)
            .map(|(price, level)| (*price, level.total_quantity))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(levels)
            .map(|(price, level)| (*price, level.total_quantity))
            .collect();
        BookDepth {
            timestamp: self.last_update,
            symbol: self.symbol.clone(),
            bids,
            asks,
        }
    }

    pub fn contains(&self, order_id: &Uuid) -> bool {
        self.order_index.contains_key(order_id)
    }

    // The matching loop in engine.rs drives the internals below.

    pub(crate) fn level_mut(&mut self, side: Side, price: Decimal) -> Option<&mut PriceLevel> {
        self.side_mut(side).get_mut(&price)
    }

    pub(crate) fn remove_level(&mut self, side: Side, price: Decimal) {
        self.side_mut(side).remove(&price);
    }

    pub(crate) fn unindex(&mut self, order_id: &Uuid) {
        self.order_index.remove(order_id);
    }

    pub(crate) fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    /// Walks one side best-first, feeding `(price, level)` to the visitor
    /// until it returns `false`. Read-only; the FOK pre-check relies on it.
    pub(crate) fn walk_levels<F>(&self, side: Side, mut visit: F)
    where
        F: FnMut(Decimal, &PriceLevel) -> bool,
    {
        match side {
            Side::Buy => {
                for (price, level) in self.bids.iter().rev() {
                    if !visit(*price, level) {
                        break;
                    }
                }
            }
            Side::Sell => {
                for (price, level) in self.asks.iter() {
                    if !visit(*price, level) {
                        break;
                    }
                }
            }
        }
    }
}
