use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;

use matching_engine::{api::router, state::AppState};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> Router {
    router(AppState::new())
}

async fn body_json(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_order(app: &Router, body: Value) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/orders")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn submit_limit_order_rests_and_reports_snapshot() {
    let app = test_app();

    let res = post_order(
        &app,
        json!({
            "symbol": "btc-usdt",
            "order_type": "limit",
            "side": "buy",
            "quantity": 1.5,
            "price": 50000.25
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["success"], true);
    assert_eq!(v["order"]["symbol"], "BTC-USDT");
    assert_eq!(v["order"]["status"], "pending");
    assert_eq!(v["order"]["quantity"], "1.5");
    assert_eq!(v["order"]["price"], "50000.25");
    assert_eq!(v["order"]["filled_quantity"], "0");
    assert_eq!(v["order"]["remaining_quantity"], "1.5");
    assert!(
        v["order"]["timestamp"].as_str().unwrap().ends_with('Z'),
        "timestamps are ISO-8601 UTC"
    );
    assert!(v["trades"].as_array().unwrap().is_empty());

    let res = get(&app, "/api/orderbook/BTC-USDT").await;
    assert_eq!(res.status(), StatusCode::OK);
    let book = body_json(res).await;
    assert_eq!(book["bids"][0][0], "50000.25");
    assert_eq!(book["bids"][0][1], "1.5");
    assert!(book["asks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn crossing_orders_report_trades_with_string_decimals() {
    let app = test_app();

    post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "limit",
            "side": "sell",
            "quantity": 2,
            "price": 100
        }),
    )
    .await;

    let res = post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "limit",
            "side": "buy",
            "quantity": 1,
            "price": 101
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["order"]["status"], "filled");
    let trades = v["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["price"], "100", "execution at the maker's price");
    assert_eq!(trades[0]["quantity"], "1");
    assert_eq!(trades[0]["aggressor_side"], "buy");

    let res = get(&app, "/api/bbo/BTC-USDT").await;
    let bbo = body_json(res).await;
    assert_eq!(bbo["bid"], Value::Null);
    assert_eq!(bbo["ask"], "100");
    assert_eq!(bbo["spread"], Value::Null);
}

#[tokio::test]
async fn create_order_rejects_zero_qty() {
    let app = test_app();

    let res = post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "limit",
            "side": "buy",
            "quantity": 0,
            "price": 50
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["success"], false);
    assert_eq!(v["order"]["status"], "rejected");
    assert!(
        v["message"]
            .as_str()
            .unwrap()
            .contains("quantity must be positive")
    );
}

#[tokio::test]
async fn create_order_rejects_market_with_price() {
    let app = test_app();

    let res = post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "market",
            "side": "buy",
            "quantity": 1,
            "price": 100
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["order"]["status"], "rejected");
}

#[tokio::test]
async fn create_order_unknown_type_yields_422_from_loggedjson() {
    let app = test_app();

    let res = post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "stop",
            "side": "buy",
            "quantity": 1,
            "price": 100
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let v = body_json(res).await;
    assert!(v["error"].as_str().is_some());
}

#[tokio::test]
async fn fok_business_reject_is_200_with_success_false() {
    let app = test_app();

    post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "limit",
            "side": "sell",
            "quantity": 0.5,
            "price": 100
        }),
    )
    .await;

    let res = post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "fok",
            "side": "buy",
            "quantity": 2,
            "price": 100
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK, "business outcome, not a 4xx");
    let v = body_json(res).await;
    assert_eq!(v["success"], false);
    assert_eq!(v["order"]["status"], "cancelled");
    assert!(v["trades"].as_array().unwrap().is_empty());

    // book unchanged
    let book = body_json(get(&app, "/api/orderbook/BTC-USDT").await).await;
    assert_eq!(book["asks"][0][0], "100");
    assert_eq!(book["asks"][0][1], "0.5");
}

#[tokio::test]
async fn orderbook_depth_out_of_range_rejected() {
    let app = test_app();

    let res = get(&app, "/api/orderbook/BTC-USDT?depth=0").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = get(&app, "/api/orderbook/BTC-USDT?depth=101").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["error"].as_str().unwrap().contains("between 1 and 100"));

    // unknown symbols are an empty book, not an error
    let res = get(&app, "/api/orderbook/DOGE-USDT?depth=5").await;
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert!(v["bids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn trades_limit_out_of_range_rejected() {
    let app = test_app();

    let res = get(&app, "/api/trades?limit=0").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = get(&app, "/api/trades?limit=201").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trades_endpoint_most_recent_first() {
    let app = test_app();

    post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "limit",
            "side": "sell",
            "quantity": 3,
            "price": 52
        }),
    )
    .await;
    for _ in 0..2 {
        post_order(
            &app,
            json!({
                "symbol": "BTC-USDT",
                "order_type": "market",
                "side": "buy",
                "quantity": 1
            }),
        )
        .await;
    }

    let res = get(&app, "/api/trades?symbol=BTC-USDT&limit=50").await;
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["count"], 2);
    let trades = v["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 2);
    // both fills at the resting price
    assert_eq!(trades[0]["price"], "52");
    assert_eq!(trades[1]["price"], "52");

    let res = get(&app, "/api/trades?symbol=ETH-USDT&limit=50").await;
    let v = body_json(res).await;
    assert_eq!(v["count"], 0);
}

#[tokio::test]
async fn limit_order_rests_then_cancel_removes_it() {
    let app = test_app();

    let res = post_order(
        &app,
        json!({
            "symbol": "BTC-USDT",
            "order_type": "limit",
            "side": "buy",
            "quantity": 10,
            "price": 48
        }),
    )
    .await;
    let order_id = body_json(res).await["order"]["order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let cancel = json!({ "symbol": "BTC-USDT", "order_id": order_id });
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/orders")
                .header("content-type", "application/json")
                .body(Body::from(cancel.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["success"], true);
    assert_eq!(v["order"]["status"], "cancelled");

    let book = body_json(get(&app, "/api/orderbook/BTC-USDT").await).await;
    assert!(book["bids"].as_array().unwrap().is_empty());

    // cancelling again is a 404
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/orders")
                .header("content-type", "application/json")
                .body(Body::from(cancel.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let v = body_json(res).await;
    assert!(v["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn symbols_lists_active_books() {
    let app = test_app();

    let res = get(&app, "/api/symbols").await;
    let v = body_json(res).await;
    assert_eq!(v["count"], 0);

    post_order(
        &app,
        json!({
            "symbol": "eth-usdt",
            "order_type": "limit",
            "side": "buy",
            "quantity": 1,
            "price": 2000
        }),
    )
    .await;

    let v = body_json(get(&app, "/api/symbols").await).await;
    assert_eq!(v["count"], 1);
    assert_eq!(v["symbols"][0], "ETH-USDT");
}

#[tokio::test]
async fn health_and_root() {
    let app = test_app();

    let res = get(&app, "/health").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "healthy");

    let res = get(&app, "/").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "running");
}
