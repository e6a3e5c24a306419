/// HTTP contract tests: routes, status codes, and error bodies.
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use hashmark_rpc::{ADMIN_KEY_HEADER, RpcState, router};
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn app(admin_key: Option<&str>) -> Router {
    router(RpcState::for_tests(admin_key.map(str::to_string)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn fund(app: &Router, account: &str, amount_hbar: f64) {
    let (status, _) = send(
        app,
        post(
            &format!("/accounts/{account}/deposit"),
            json!({"amount_hbar": amount_hbar}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn create_clob_market(app: &Router) -> String {
    fund(app, "0.0.1001", 10_000.0).await;
    let (status, body) = send(
        app,
        post(
            "/markets",
            json!({
                "question": "Will staking rewards rise this quarter?",
                "creator": "0.0.1001",
                "close_at_ms": 4_102_444_800_000i64,
                "outcomes": ["YES", "NO"],
                "regime": "HIGH_LIQUIDITY",
                "initial_funding_hbar": 100.0,
                "seed_orders": [
                    {"outcome": 0, "side": "BID", "price_cents": 40, "quantity_hbar": 10.0},
                    {"outcome": 0, "side": "ASK", "price_cents": 60, "quantity_hbar": 10.0}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app(None);
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_market_create_and_fetch() {
    let app = app(None);
    let id = create_clob_market(&app).await;

    let (status, body) = send(&app, get(&format!("/markets/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OPEN");
    assert_eq!(body["escrow_hbar"], 100.0);

    let (status, body) = send(&app, get("/markets?status=OPEN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_validation_errors_are_400_with_code() {
    let app = app(None);
    fund(&app, "0.0.1001", 1_000.0).await;

    let (status, body) = send(
        &app,
        post(
            "/markets",
            json!({
                "question": "",
                "creator": "0.0.1001",
                "close_at_ms": 4_102_444_800_000i64,
                "outcomes": ["YES", "NO"],
                "regime": "HIGH_LIQUIDITY",
                "initial_funding_hbar": 100.0
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION");
    assert!(body["error"].as_str().unwrap().contains("question"));
}

#[tokio::test]
async fn test_unknown_market_is_404() {
    let app = app(None);
    let (status, body) = send(
        &app,
        get("/markets/00000000-0000-7000-8000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_orders_and_book_depth() {
    let app = app(None);
    let id = create_clob_market(&app).await;
    fund(&app, "0.0.2001", 500.0).await;

    let (status, body) = send(
        &app,
        post(
            &format!("/markets/{id}/orders"),
            json!({
                "account_id": "0.0.2001",
                "outcome": 0,
                "side": "BID",
                "price_cents": 60,
                "quantity_hbar": 3.0
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["fills"].as_array().unwrap().len(), 1);
    assert_eq!(body["fills"][0]["price_cents"], 60);

    let (status, body) = send(&app, get(&format!("/markets/{id}/book?outcome=0"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bids"][0]["price_cents"], 40);
    assert_eq!(body["asks"][0]["price_cents"], 60);
    assert_eq!(body["asks"][0]["quantity_hbar"], 7.0);

    // A zero-cent price never reaches the matcher
    let (status, body) = send(
        &app,
        post(
            &format!("/markets/{id}/orders"),
            json!({
                "account_id": "0.0.2001",
                "outcome": 0,
                "side": "BID",
                "price_cents": 0,
                "quantity_hbar": 1.0
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION");
}

#[tokio::test]
async fn test_cancel_requires_owner() {
    let app = app(None);
    let id = create_clob_market(&app).await;
    fund(&app, "0.0.2001", 100.0).await;

    let (_, body) = send(
        &app,
        post(
            &format!("/markets/{id}/orders"),
            json!({
                "account_id": "0.0.2001",
                "outcome": 1,
                "side": "BID",
                "price_cents": 30,
                "quantity_hbar": 5.0
            }),
        ),
    )
    .await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/orders/{order_id}?account_id=0.0.9999"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATE_CONFLICT");

    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/orders/{order_id}?account_id=0.0.2001"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
}

#[tokio::test]
async fn test_positions_round_trip() {
    let app = app(None);
    let id = create_clob_market(&app).await;
    fund(&app, "0.0.2001", 200.0).await;

    let (status, body) = send(
        &app,
        post(
            "/derivatives/positions",
            json!({
                "account_id": "0.0.2001",
                "market_id": id,
                "outcome": 0,
                "side": "LONG",
                "size_hbar": 50.0,
                "leverage": 5,
                "margin_mode": "ISOLATED"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["margin_hbar"], 10.0);
    assert_eq!(body["entry_price"], 0.5);
    let position_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        get("/derivatives/positions?account_id=0.0.2001"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        post(
            &format!("/derivatives/positions/{position_id}/close"),
            json!({"account_id": "0.0.2001"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"]["status"], "CLOSED");

    let (status, body) = send(&app, get("/derivatives/liquidations?limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_state_machine_violations_are_409() {
    let app = app(Some("sekrit"));
    let id = create_clob_market(&app).await;

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/markets/{id}/transition"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(ADMIN_KEY_HEADER, "sekrit")
            .body(Body::from(json!({"status": "SETTLED"}).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATE_CONFLICT");
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    // 503 while no key is configured
    let app_no_key = app(None);
    let (status, body) = send(
        &app_no_key,
        post("/insurance/deposit", json!({"amount_hbar": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "ADMIN_UNAVAILABLE");

    // 403 with the wrong key, 200 with the right one
    let app = app(Some("sekrit"));
    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/insurance/deposit")
            .header(header::CONTENT_TYPE, "application/json")
            .header(ADMIN_KEY_HEADER, "wrong")
            .body(Body::from(json!({"amount_hbar": 10.0}).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/insurance/deposit")
            .header(header::CONTENT_TYPE, "application/json")
            .header(ADMIN_KEY_HEADER, "sekrit")
            .body(Body::from(json!({"amount_hbar": 10.0}).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance_hbar"], 10.0);
}

#[tokio::test]
async fn test_insufficient_funds_is_400() {
    let app = app(None);
    let id = create_clob_market(&app).await;

    let (status, body) = send(
        &app,
        post(
            &format!("/markets/{id}/orders"),
            json!({
                "account_id": "0.0.7777",
                "outcome": 0,
                "side": "BID",
                "price_cents": 50,
                "quantity_hbar": 100.0
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
}
