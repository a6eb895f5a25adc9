//! HTTP surface tests driven through the assembled router.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use tower::util::ServiceExt;

use common::{harness, ALICE, BOB};
use universal_exchange_backend::app;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal fields serialize as strings")).unwrap()
}

#[tokio::test]
async fn health_reports_ok_with_a_trace_id() {
    let app = app(harness().into_app_state());

    let response = app
        .clone()
        .oneshot(get("/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn assets_returns_the_fixed_catalogue() {
    let app = app(harness().into_app_state());

    let (status, body) = send(&app, get("/api/assets")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    let symbols: Vec<&str> = body["assets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["symbol"].as_str().unwrap())
        .collect();
    assert_eq!(symbols, vec!["USDC", "USDT", "ETH", "BTC", "DAI"]);
    assert_eq!(body["assets"][0]["type"], "stablecoin");
    assert_eq!(body["assets"][2]["decimals"], 18);
}

#[tokio::test]
async fn order_flow_end_to_end() {
    let h = harness();
    h.fund(ALICE, "ETH", dec!(2)).await;
    h.fund(BOB, "USDC", dec!(10000)).await;
    let app = app(h.into_app_state());

    // Alice posts a resting ask.
    let (status, body) = send(
        &app,
        post_json(
            "/api/orders",
            json!({
                "address": ALICE,
                "asset": "ETH",
                "side": "sell",
                "type": "limit",
                "amount": "1",
                "price": "1999"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["tradeId"].is_null());
    let sell_id = body["data"]["orderId"].as_str().unwrap().to_string();

    // The book shows one ask level.
    let (status, body) = send(&app, get("/api/orders/book/ETH")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["asset"], "ETH");
    let asks = body["data"]["asks"].as_array().unwrap();
    assert_eq!(asks.len(), 1);
    assert_eq!(decimal(&asks[0]["price"]), dec!(1999));
    assert_eq!(decimal(&asks[0]["totalRemaining"]), dec!(1));
    assert_eq!(asks[0]["orderCount"], 1);

    // Bob crosses it.
    let (status, body) = send(
        &app,
        post_json(
            "/api/orders",
            json!({
                "address": BOB,
                "asset": "ETH",
                "side": "buy",
                "type": "limit",
                "amount": "1",
                "price": "2000"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "filled");
    assert_eq!(decimal(&body["data"]["remainingAmount"]), Decimal::ZERO);
    let trades = body["data"]["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(decimal(&trades[0]["price"]), dec!(1999));
    assert_eq!(body["data"]["tradeId"], trades[0]["id"]);

    // Balances settled per the earlier order's price.
    let (_, body) = send(&app, get(&format!("/api/balance/{ALICE}?asset=USDC"))).await;
    assert_eq!(decimal(&body["balance"]), dec!(1999));
    let (_, body) = send(&app, get(&format!("/api/balance/{BOB}?asset=USDC"))).await;
    assert_eq!(decimal(&body["balance"]), dec!(8001));
    let (_, body) = send(&app, get(&format!("/api/balance/{BOB}?asset=ETH"))).await;
    assert_eq!(decimal(&body["balance"]), dec!(1));

    // The maker order reads filled.
    let (status, body) = send(&app, get(&format!("/api/orders/{sell_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "filled");

    // Trade history shows the fill for both filters.
    let (_, body) = send(&app, get("/api/trades?asset=ETH")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = send(&app, get(&format!("/api/trades?address={ALICE}"))).await;
    assert_eq!(body["data"][0]["sellerAddress"], ALICE);
}

#[tokio::test]
async fn order_listing_filters_by_address_and_status() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(100000)).await;
    h.fund(BOB, "USDC", dec!(100000)).await;
    let app = app(h.into_app_state());

    for (address, price) in [(ALICE, "2000"), (ALICE, "2001"), (BOB, "1999")] {
        let (status, _) = send(
            &app,
            post_json(
                "/api/orders",
                json!({
                    "address": address,
                    "asset": "ETH",
                    "side": "buy",
                    "type": "limit",
                    "amount": "1",
                    "price": price
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(&app, get(&format!("/api/orders?address={ALICE}"))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    // Newest first.
    assert_eq!(decimal(&body["data"][0]["price"]), dec!(2001));

    let (_, body) = send(&app, get("/api/orders?status=pending")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, body) = send(&app, get("/api/orders?status=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cancel_route_rejects_the_second_attempt() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(10000)).await;
    let app = app(h.into_app_state());

    let (_, body) = send(
        &app,
        post_json(
            "/api/orders",
            json!({
                "address": ALICE,
                "asset": "ETH",
                "side": "buy",
                "type": "limit",
                "amount": "1",
                "price": "2000"
            }),
        ),
    )
    .await;
    let order_id = body["data"]["orderId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, post_json(&format!("/api/orders/{order_id}/cancel"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, post_json(&format!("/api/orders/{order_id}/cancel"), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Cannot Cancel");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Current status: cancelled"));
}

#[tokio::test]
async fn order_validation_and_balance_errors_use_the_envelope_shape() {
    let h = harness();
    let app = app(h.into_app_state());

    // Malformed address.
    let (status, body) = send(
        &app,
        post_json(
            "/api/orders",
            json!({
                "address": "nope",
                "asset": "ETH",
                "side": "buy",
                "type": "limit",
                "amount": "1",
                "price": "2000"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Validation Error");

    // No funds.
    let (status, body) = send(
        &app,
        post_json(
            "/api/orders",
            json!({
                "address": ALICE,
                "asset": "ETH",
                "side": "sell",
                "type": "limit",
                "amount": "1",
                "price": "2000"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient Balance");

    // Unknown order id.
    let (status, body) = send(
        &app,
        get("/api/orders/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn settlement_routes_use_the_plain_error_shape() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(500)).await;
    let app = app(h.into_app_state());

    // Accepted settlement.
    let (status, body) = send(
        &app,
        post_json(
            "/api/settle",
            json!({
                "from": ALICE,
                "to": BOB,
                "amount": "100",
                "asset": "USDC"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let id = body["settlementId"].as_str().unwrap().to_string();

    // It shows up in the listings with the wire field names.
    let (_, body) = send(&app, get("/api/settlements")).await;
    assert_eq!(body[0]["from"], ALICE);
    assert_eq!(body[0]["to"], BOB);
    assert_eq!(body[0]["status"], "pending");

    let (status, body) = send(&app, get(&format!("/api/settlements/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["amount"]), dec!(100));

    let (_, body) = send(&app, get(&format!("/api/settlements/address/{ALICE}"))).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["settlements"][0]["role"], "sender");

    // Self-transfer rejected with the plain shape.
    let (status, body) = send(
        &app,
        post_json(
            "/api/settle",
            json!({
                "from": ALICE,
                "to": ALICE,
                "amount": "1",
                "asset": "USDC"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["error"], "Validation Error");
    assert!(body.get("success").is_none());

    // Unknown settlement id is a plain 404.
    let (status, body) = send(
        &app,
        get("/api/settlements/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
}

#[tokio::test]
async fn balance_listing_includes_all_assets() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(500)).await;
    h.fund(ALICE, "ETH", dec!(2)).await;
    let app = app(h.into_app_state());

    let (status, body) = send(&app, get(&format!("/api/balance/{ALICE}/all"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], ALICE);
    assert_eq!(body["total"], 2);
    // Sorted by asset.
    assert_eq!(body["balances"][0]["asset"], "ETH");
    assert_eq!(decimal(&body["balances"][0]["balance"]), dec!(2));
    assert_eq!(body["balances"][1]["asset"], "USDC");

    // Missing asset query is a validation error.
    let (status, _) = send(&app, get(&format!("/api/balance/{ALICE}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
