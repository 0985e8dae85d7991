use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::{orderbook::BookDepth, state::AppState, trade::Trade};

/// Market-data frame pushed to subscribed clients.
///
/// Serialized as an internally-tagged enum:
/// ```json
/// {"type": "trade", "data": { /* trade fields */ }}
/// {"type": "orderbook", "data": { /* depth-20 snapshot */ }}
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MarketDataFrame {
    Trade(Trade),
    Orderbook(BookDepth),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Trades,
    Orderbook,
}

/// Client-initiated subscription request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRequest {
    pub action: Action,
    pub channel: Channel,
}

/// `GET /ws`
/// Upgrades the connection and drives the market-data push loop.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection loop: greets the client, tracks its channel subscriptions
/// as local flags, and forwards broadcast trades/depth snapshots while
/// subscribed.
///
/// Keeping subscription state inside the connection task means the
/// broadcaster never mutates a shared subscriber set mid-iteration; a
/// dropped connection just ends its own task.
pub async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut trade_rx = state.trade_tx.subscribe();
    let mut book_rx = state.book_tx.subscribe();
    let mut trades_on = false;
    let mut book_on = false;

    let welcome = json!({
        "type": "connected",
        "message": "connected to matching engine market data",
        "available_channels": ["trades", "orderbook"]
    });
    if let Err(e) = socket.send(Message::Text(welcome.to_string().into())).await {
        error!("failed to send welcome frame: {:?}", e);
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(txt))) => {
                        let reply = match serde_json::from_str::<ClientRequest>(&txt) {
                            Ok(req) => {
                                let on = req.action == Action::Subscribe;
                                match req.channel {
                                    Channel::Trades => trades_on = on,
                                    Channel::Orderbook => book_on = on,
                                }
                                info!(action = ?req.action, channel = ?req.channel, "ws subscription change");
                                let verb = if on { "subscribed" } else { "unsubscribed" };
                                json!({ "type": verb, "channel": req.channel })
                            }
                            Err(_) => json!({ "type": "error", "message": "Invalid JSON" }),
                        };
                        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ignore pings/binary
                    Some(Err(e)) => {
                        warn!("ws receive error: {:?}", e);
                        break;
                    }
                }
            }
            res = trade_rx.recv() => {
                match res {
                    Ok(trade) => {
                        if trades_on {
                            let frame = MarketDataFrame::Trade(trade);
                            let Ok(text) = serde_json::to_string(&frame) else { continue };
                            if let Err(e) = socket.send(Message::Text(text.into())).await {
                                error!("ws send trade failed: {:?}", e);
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws subscriber lagging on trades; dropped oldest");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            res = book_rx.recv() => {
                match res {
                    Ok(depth) => {
                        if book_on {
                            let frame = MarketDataFrame::Orderbook(depth);
                            let Ok(text) = serde_json::to_string(&frame) else { continue };
                            if let Err(e) = socket.send(Message::Text(text.into())).await {
                                error!("ws send snapshot failed: {:?}", e);
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws subscriber lagging on book updates; dropped oldest");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
