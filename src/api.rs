use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    routing::post,
};

use crate::{
    engine::ExecutionReport,
    orders::{OrderRequest, OrderStatus},
    state::AppState,
    trade::Trade,
    ws,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

/// JSON extractor that logs rejected payloads before returning 422, so bad
/// client traffic is visible in the server logs.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        //capture request details for logging
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                //cap body preview to avoid giant logs
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "request rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
            }
        }
    }
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub symbol: String,
    pub order_id: Uuid,
}

#[derive(Deserialize)]
pub struct DepthQuery {
    #[serde(default = "default_depth")]
    pub depth: usize,
}
fn default_depth() -> usize {
    10
}

#[derive(Deserialize)]
pub struct TradesQuery {
    pub symbol: Option<String>,
    #[serde(default = "default_trades_limit")]
    pub limit: usize,
}
fn default_trades_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct TradesPage {
    pub trades: Vec<Trade>,
    pub count: usize,
}

/// `GET /` — service identity.
async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "matching-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// `GET /health`
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// `POST /api/orders`
///
/// Submits a new order.
/// *Success:* 200, JSON [`ExecutionReport`] — including FOK orders rejected
///   for insufficient liquidity (`success=false`, business outcome).
/// *Validation failure:* 400, JSON report with a REJECTED order snapshot.
/// *Malformed body:* 422 from [`LoggedJson`].
pub async fn submit_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<OrderRequest>,
) -> Result<Json<ExecutionReport>, ApiErr> {
    let report = {
        let mut engine = state.engine.write().await;
        engine.submit(payload)
    };
    if !report.success && report.order.status == OrderStatus::Rejected {
        let body = serde_json::to_value(&report)
            .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
        return Err((StatusCode::BAD_REQUEST, Json(body)));
    }
    Ok(Json(report))
}

/// `DELETE /api/orders` with `{symbol, order_id}`
///
/// *Success:* 200, `{success, message, order}` with the CANCELLED snapshot.
/// *Failure:* 404 when the book or the order is unknown.
pub async fn cancel_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<CancelRequest>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let result = {
        let mut engine = state.engine.write().await;
        engine.cancel(&payload.symbol, &payload.order_id)
    };
    match result {
        Ok(order) => {
            info!(order_id = %order.id, "order cancelled via api");
            Ok(Json(json!({
                "success": true,
                "message": "order cancelled",
                "order": order
            })))
        }
        Err(e) => {
            warn!(order_id = %payload.order_id, "cancel failed: {e}");
            Err(err(StatusCode::NOT_FOUND, &e.to_string()))
        }
    }
}

/// `GET /api/orderbook/{symbol}?depth=10`
///
/// Top-of-book depth snapshot; `depth` must be within `[1, 100]`.
pub async fn get_order_book(
    Path(symbol): Path<String>,
    Query(q): Query<DepthQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiErr> {
    if !(1..=100).contains(&q.depth) {
        return Err(err(
            StatusCode::BAD_REQUEST,
            "depth must be between 1 and 100",
        ));
    }
    let engine = state.engine.read().await;
    Ok(Json(engine.order_book(&symbol, q.depth)))
}

/// `GET /api/bbo/{symbol}` — best bid/offer and spread, nulls when absent.
pub async fn get_bbo(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let engine = state.engine.read().await;
    Json(engine.bbo(&symbol))
}

/// `GET /api/trades?symbol=&limit=50`
///
/// Most-recent-first trade log page; `limit` must be within `[1, 200]`.
pub async fn get_recent_trades(
    Query(q): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesPage>, ApiErr> {
    if !(1..=200).contains(&q.limit) {
        return Err(err(
            StatusCode::BAD_REQUEST,
            "limit must be between 1 and 200",
        ));
    }
    let engine = state.engine.read().await;
    let trades = engine.recent_trades(q.symbol.as_deref(), q.limit);
    let count = trades.len();
    Ok(Json(TradesPage { trades, count }))
}

/// `GET /api/symbols` — symbols with an active book.
pub async fn get_symbols(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    let symbols = engine.symbols();
    Json(json!({ "count": symbols.len(), "symbols": symbols }))
}

/// Constructs the application `Router` with all REST routes, the WebSocket
/// upgrade endpoint, and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/orders", post(submit_order).delete(cancel_order))
        .route("/api/orderbook/{symbol}", get(get_order_book))
        .route("/api/bbo/{symbol}", get(get_bbo))
        .route("/api/trades", get(get_recent_trades))
        .route("/api/symbols", get(get_symbols))
        .route("/ws", get(ws::ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
