mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use backlink_escrow::build_router;

use crate::common::{seed_marketplace, Marketplace, TestApp, ADMIN_KEY};

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).to_string()))
    };
    (status, value)
}

fn post_as(user_id: i32, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_as(user_id: i32, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

fn order_body(m: &Marketplace, amount: u32) -> Value {
    json!({
        "listing": m.listing.id.to_string(),
        "totalAmount": amount,
        "content": { "title": "Guest post", "links": ["https://buyer.example.com"] }
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, _) = send(build_router(app.state.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(200)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/orders")
        .header("content-type", "application/json")
        .body(Body::from(order_body(&m, 100).to_string()))
        .unwrap();
    let (status, body) = send(build_router(app.state.clone()), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_create_and_accept_order_flow() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(200)).await;

    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(m.advertiser_id, "/api/orders", order_body(&m, 100)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["created"], true);
    assert_eq!(body["order"]["status"], "pending");
    let order_id = body["order"]["id"].as_i64().unwrap();

    // Same submission again inside the window
    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(m.advertiser_id, "/api/orders", order_body(&m, 100)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);
    assert_eq!(body["order"]["id"].as_i64().unwrap(), order_id);

    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(m.publisher_id, &format!("/api/orders/{}/accept", order_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["publisherId"].as_i64().unwrap(), m.publisher_id as i64);

    let (status, body) = send(
        build_router(app.state.clone()),
        get_as(m.publisher_id, &format!("/api/orders/{}", order_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"]["title"], "Guest post");
}

#[tokio::test]
async fn test_insufficient_funds_maps_to_402() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(50)).await;

    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(m.advertiser_id, "/api/orders", order_body(&m, 100)),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
}

#[tokio::test]
async fn test_illegal_transition_maps_to_409() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(200)).await;
    let (_, body) = send(
        build_router(app.state.clone()),
        post_as(m.advertiser_id, "/api/orders", order_body(&m, 100)),
    )
    .await;
    let order_id = body["order"]["id"].as_i64().unwrap();

    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(
            m.advertiser_id,
            &format!("/api/orders/{}/complete", order_id),
            json!({}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_wallet_endpoint() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(200)).await;

    let (status, body) = send(
        build_router(app.state.clone()),
        get_as(m.advertiser_id, "/api/wallets/me"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["id"].as_i64().unwrap(), m.advertiser_wallet.id as i64);
    assert_eq!(body["type"], "advertiser");
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        build_router(app.state.clone()),
        get_as(m.advertiser_id, "/api/wallets/me?type=platform"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deposit_confirmation_requires_verified_payment() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(0)).await;

    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(
            m.advertiser_id,
            "/api/deposits/confirm",
            json!({ "gatewayTransactionId": "pi_unknown", "amount": 40 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "GATEWAY_ERROR");

    app.gateway.verify("pi_777");
    for expected_replay in [false, true] {
        let (status, body) = send(
            build_router(app.state.clone()),
            post_as(
                m.advertiser_id,
                "/api/deposits/confirm",
                json!({ "gatewayTransactionId": "pi_777", "amount": 40 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["replayed"], expected_replay);
    }

    assert_eq!(app.wallet(m.advertiser_wallet.id).await.balance, dec!(40));

    // Someone else presenting the same payment
    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(
            m.publisher_id,
            "/api/deposits/confirm",
            json!({ "gatewayTransactionId": "pi_777", "amount": 40 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(app.wallet(m.advertiser_wallet.id).await.balance, dec!(40));
}

#[tokio::test]
async fn test_admin_routes_require_api_key() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(200)).await;

    let without_key = post_as(m.advertiser_id, "/api/withdrawals/1/approve", json!({}));
    let (status, body) = send(build_router(app.state.clone()), without_key).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let wrong_key = Request::builder()
        .method("POST")
        .uri(format!("/api/listings/{}/tat", m.listing.id))
        .header("x-api-key", "not-the-key")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(build_router(app.state.clone()), wrong_key).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let with_key = Request::builder()
        .method("POST")
        .uri(format!("/api/listings/{}/tat", m.listing.id))
        .header("x-api-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(build_router(app.state.clone()), with_key).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["updated"], false);

    let reconcile = Request::builder()
        .uri(format!("/api/wallets/{}/reconcile", m.advertiser_wallet.id))
        .header("x-api-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(build_router(app.state.clone()), reconcile).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consistent"], true);
}

#[tokio::test]
async fn test_withdrawal_without_publisher_wallet() {
    let app = TestApp::new().await;
    let m = seed_marketplace(&app, dec!(200)).await;

    let (status, body) = send(
        build_router(app.state.clone()),
        post_as(
            m.publisher_id,
            "/api/withdrawals",
            json!({ "amount": 10, "method": "paypal" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(
        build_router(app.state.clone()),
        get_as(m.publisher_id, "/api/withdrawals"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}
