use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::orderbook::{Bbo, BookDepth, OrderBook};
use crate::orders::{Order, OrderRequest, OrderStatus, OrderType, Side};
use crate::trade::Trade;

/// Depth of the snapshot attached to every book-update event.
const BOOK_EVENT_DEPTH: usize = 20;

type TradeObserver = Box<dyn Fn(&Trade) + Send + Sync>;
type BookObserver = Box<dyn Fn(&BookDepth) + Send + Sync>;

/// Outcome of one order submission: the final order snapshot plus every
/// trade it produced, in execution order. `success` is false for validation
/// rejects and for FOK orders that could not be fully filled.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub order: Order,
    pub message: String,
    pub trades: Vec<Trade>,
}

/// Continuous-auction matching engine over per-symbol books.
///
/// Matching follows strict price-time priority: better prices first, FIFO
/// within a price level, and every fill prints at the resting (maker) order's
/// price so an aggressor can never trade through a better standing quote.
///
/// The struct itself is synchronous; all mutating entry points are expected
/// to run under a single writer (see `state::AppState`, which wraps the
/// engine in an async `RwLock`). Observers fire inside that critical section
/// and must not re-enter the engine.
pub struct MatchingEngine {
    books: HashMap<String, OrderBook>,
    trades: Vec<Trade>,
    next_seq: u64,
    trade_observers: Vec<TradeObserver>,
    book_observers: Vec<BookObserver>,
}

impl MatchingEngine {
    pub fn new() -> Self {
        info!("matching engine initialized");
        Self {
            books: HashMap::new(),
            trades: Vec::new(),
            next_seq: 0,
            trade_observers: Vec::new(),
            book_observers: Vec::new(),
        }
    }

    /// Registers a callback invoked for every executed trade, in creation
    /// order. Observers are configured at startup, before serving begins.
    pub fn on_trade<F>(&mut self, f: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.trade_observers.push(Box::new(f));
    }

    /// Registers a callback invoked once per book mutation with a depth
    /// snapshot of the touched book.
    pub fn on_book_update<F>(&mut self, f: F)
    where
        F: Fn(&BookDepth) + Send + Sync + 'static,
    {
        self.book_observers.push(Box::new(f));
    }

    /// Submits an order and returns its execution report.
    ///
    /// Validation failures return a REJECTED snapshot without touching any
    /// book. Otherwise the order is routed to its type's handler, trades are
    /// appended to the log, and one book-update event plus one trade event
    /// per fill are dispatched.
    pub fn submit(&mut self, req: OrderRequest) -> ExecutionReport {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut order = match Order::new(
            &req.symbol,
            req.order_type,
            req.side,
            req.quantity,
            req.price,
            seq,
        ) {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    symbol = %req.symbol,
                    order_type = ?req.order_type,
                    side = ?req.side,
                    quantity = %req.quantity,
                    "order rejected: {e}"
                );
                return ExecutionReport {
                    success: false,
                    order: Order::rejected(&req),
                    message: e.to_string(),
                    trades: Vec::new(),
                };
            }
        };

        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            order_type = ?order.order_type,
            side = ?order.side,
            quantity = %order.quantity,
            price = ?order.price,
            "processing order"
        );

        let book = self
            .books
            .entry(order.symbol.clone())
            .or_insert_with_key(|symbol| {
                info!(%symbol, "created order book");
                OrderBook::new(symbol.clone())
            });

        let (success, message, trades) = match order.order_type {
            OrderType::Market => Self::process_market(&mut order, book),
            OrderType::Limit => Self::process_limit(&mut order, book),
            OrderType::Ioc => Self::process_ioc(&mut order, book),
            OrderType::Fok => Self::process_fok(&mut order, book),
        };

        if success {
            // A rejected FOK is a pure no-op; everything else counts as a
            // book mutation and gets exactly one update event, then the
            // trade events in creation order.
            self.trades.extend(trades.iter().cloned());
            let depth = self.books[&order.symbol].depth(BOOK_EVENT_DEPTH);
            self.notify_book_update(&depth);
            for trade in &trades {
                self.notify_trade(trade);
            }
        }

        ExecutionReport {
            success,
            order,
            message,
            trades,
        }
    }

    /// Market order: execute immediately at the best available prices; any
    /// residual is cancelled, never rested.
    fn process_market(order: &mut Order, book: &mut OrderBook) -> (bool, String, Vec<Trade>) {
        let trades = match_order(order, book);
        let message = if order.remaining_quantity > Decimal::ZERO {
            order.status = OrderStatus::Cancelled;
            warn!(
                order_id = %order.id,
                filled = %order.filled_quantity,
                remaining = %order.remaining_quantity,
                "market order partially filled and cancelled"
            );
            "market order partially filled"
        } else {
            order.status = OrderStatus::Filled;
            "market order filled"
        };
        (true, message.to_string(), trades)
    }

    /// Limit order: match what is marketable, rest the remainder at its
    /// limit price.
    fn process_limit(order: &mut Order, book: &mut OrderBook) -> (bool, String, Vec<Trade>) {
        let trades = match_order(order, book);
        if order.remaining_quantity > Decimal::ZERO {
            order.status = if order.filled_quantity > Decimal::ZERO {
                OrderStatus::Partial
            } else {
                OrderStatus::Pending
            };
            book.add_resting(order.clone());
            info!(
                order_id = %order.id,
                remaining = %order.remaining_quantity,
                "limit order resting on book"
            );
        } else {
            order.status = OrderStatus::Filled;
        }
        (true, "limit order processed".to_string(), trades)
    }

    /// IOC: execute immediately; the unfilled portion is cancelled. The
    /// status is CANCELLED whenever a residual remains, even after partial
    /// fills; callers inspect `filled_quantity` to tell the cases apart.
    fn process_ioc(order: &mut Order, book: &mut OrderBook) -> (bool, String, Vec<Trade>) {
        let trades = match_order(order, book);
        if order.remaining_quantity > Decimal::ZERO {
            order.status = OrderStatus::Cancelled;
            info!(
                order_id = %order.id,
                unfilled = %order.remaining_quantity,
                "ioc order cancelled with residual"
            );
        } else {
            order.status = OrderStatus::Filled;
        }
        (true, "ioc order processed".to_string(), trades)
    }

    /// FOK: fill completely or reject without touching the book. The
    /// pre-check is pure; on rejection no trades exist and no events fire.
    fn process_fok(order: &mut Order, book: &mut OrderBook) -> (bool, String, Vec<Trade>) {
        if !can_fill_completely(order, book) {
            order.status = OrderStatus::Cancelled;
            info!(order_id = %order.id, "fok order cancelled - insufficient liquidity");
            return (
                false,
                "fok order cancelled - insufficient liquidity".to_string(),
                Vec::new(),
            );
        }
        let trades = match_order(order, book);
        debug_assert!(order.is_filled(), "fok pre-check guaranteed full fill");
        order.status = OrderStatus::Filled;
        (true, "fok order filled".to_string(), trades)
    }

    /// Cancels a resting order by id. Fires one book-update event on
    /// success; unknown symbols and ids are business errors, not mutations.
    pub fn cancel(&mut self, symbol: &str, order_id: &Uuid) -> Result<Order, EngineError> {
        let symbol = symbol.to_uppercase();
        let book = self
            .books
            .get_mut(&symbol)
            .ok_or_else(|| EngineError::BookNotFound(symbol.clone()))?;
        let mut order = book
            .cancel(order_id)
            .ok_or(EngineError::OrderNotFound(*order_id))?;
        order.status = OrderStatus::Cancelled;
        info!(%order_id, %symbol, "order cancelled");

        let depth = book.depth(BOOK_EVENT_DEPTH);
        self.notify_book_update(&depth);
        Ok(order)
    }

    /// Depth snapshot for a symbol; unknown symbols yield an empty book
    /// rather than an error.
    pub fn order_book(&self, symbol: &str, levels: usize) -> BookDepth {
        let symbol = symbol.to_uppercase();
        match self.books.get(&symbol) {
            Some(book) => book.depth(levels),
            None => BookDepth {
                timestamp: chrono::Utc::now(),
                symbol,
                bids: Vec::new(),
                asks: Vec::new(),
            },
        }
    }

    pub fn bbo(&self, symbol: &str) -> Bbo {
        let symbol = symbol.to_uppercase();
        let (bid, ask, spread) = match self.books.get(&symbol) {
            Some(book) => {
                let (bid, ask) = book.bbo();
                (bid, ask, book.spread())
            }
            None => (None, None, None),
        };
        Bbo {
            symbol,
            bid,
            ask,
            spread,
        }
    }

    /// Most-recent-first trades, optionally filtered by symbol.
    pub fn recent_trades(&self, symbol: Option<&str>, limit: usize) -> Vec<Trade> {
        let symbol = symbol.map(str::to_uppercase);
        self.trades
            .iter()
            .rev()
            .filter(|t| symbol.as_deref().is_none_or(|s| t.symbol == s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Symbols with an active book.
    pub fn symbols(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    fn notify_trade(&self, trade: &Trade) {
        for observer in &self.trade_observers {
            // one misbehaving subscriber must not disturb the others or
            // the matching path
            if catch_unwind(AssertUnwindSafe(|| observer(trade))).is_err() {
                error!(trade_id = %trade.trade_id, "trade observer panicked");
            }
        }
    }

    fn notify_book_update(&self, depth: &BookDepth) {
        for observer in &self.book_observers {
            if catch_unwind(AssertUnwindSafe(|| observer(depth))).is_err() {
                error!(symbol = %depth.symbol, "book observer panicked");
            }
        }
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The matching primitive: fills `taker` against the contra side of `book`
/// while it has remaining quantity, the contra side has levels, and (for
/// priced orders) the best contra price satisfies the taker's limit.
///
/// Fills print at the resting order's price, walk levels best-first, and
/// drain each level FIFO. Drained makers are popped, marked FILLED and
/// de-indexed; emptied levels are deleted before the next level is examined.
fn match_order(taker: &mut Order, book: &mut OrderBook) -> Vec<Trade> {
    let mut trades = Vec::new();

    while taker.remaining_quantity > Decimal::ZERO {
        let contra = taker.side.opposite();
        let Some(best) = book.best_price(contra) else {
            break;
        };
        if let Some(limit) = taker.price {
            let marketable = match taker.side {
                Side::Buy => best <= limit,
                Side::Sell => best >= limit,
            };
            if !marketable {
                break;
            }
        }

        // De-indexing the drained makers needs `&mut book`, so collect ids
        // while the level borrow is live and apply them after.
        let mut drained = Vec::new();
        let emptied = {
            let Some(level) = book.level_mut(contra, best) else {
                break;
            };
            while taker.remaining_quantity > Decimal::ZERO {
                let Some(maker) = level.orders.front_mut() else {
                    break;
                };
                let fill = taker.remaining_quantity.min(maker.remaining_quantity);
                taker.apply_fill(fill);
                maker.apply_fill(fill);
                level.total_quantity -= fill;

                trades.push(Trade::new(
                    &taker.symbol,
                    level.price,
                    fill,
                    taker.side,
                    maker.id,
                    taker.id,
                ));

                if maker.is_filled() {
                    maker.status = OrderStatus::Filled;
                    if let Some(done) = level.pop_head() {
                        drained.push(done.id);
                    }
                } else {
                    maker.status = OrderStatus::Partial;
                }
            }
            level.is_empty()
        };

        for id in &drained {
            book.unindex(id);
        }
        if emptied {
            book.remove_level(contra, best);
        }
    }

    if !trades.is_empty() {
        book.touch();
    }
    trades
}

/// Pure FOK pre-check: walks the contra side best-first, summing level
/// aggregates at marketable prices, and answers whether the order's full
/// quantity is available. Stops as soon as the running sum suffices.
fn can_fill_completely(order: &Order, book: &OrderBook) -> bool {
    let mut available = Decimal::ZERO;
    let mut enough = false;
    book.walk_levels(order.side.opposite(), |price, level| {
        if let Some(limit) = order.price {
            let marketable = match order.side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            };
            if !marketable {
                return false;
            }
        }
        available += level.total_quantity;
        if available >= order.quantity {
            enough = true;
            return false;
        }
        true
    });
    enough
}
