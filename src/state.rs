use crate::engine::MatchingEngine;
use crate::orderbook::BookDepth;
use crate::trade::Trade;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Shared application state handed to every handler.
///
/// The engine sits behind an async `RwLock`: `submit`/`cancel` take the
/// write half (the engine-wide exclusive gate), queries take the read half.
/// The broadcast channels fan engine events out to WebSocket subscribers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<MatchingEngine>>,
    pub trade_tx: broadcast::Sender<Trade>,
    pub book_tx: broadcast::Sender<BookDepth>,
}

impl AppState {
    pub fn new() -> Self {
        let (trade_tx, _) = broadcast::channel(1024);
        let (book_tx, _) = broadcast::channel(1024);

        // Observers are registered once, before the engine starts serving;
        // sends into an unsubscribed channel just return Err and are
        // dropped on the floor.
        let mut engine = MatchingEngine::new();
        let tx = trade_tx.clone();
        engine.on_trade(move |trade| {
            let _ = tx.send(trade.clone());
        });
        let tx = book_tx.clone();
        engine.on_book_update(move |depth| {
            let _ = tx.send(depth.clone());
        });

        Self {
            engine: Arc::new(RwLock::new(engine)),
            trade_tx,
            book_tx,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}
