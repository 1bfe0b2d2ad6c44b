use super::*;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use lethashop_core::{Environment, MpesaConfig, MpesaEnvironment, ShippingPolicy};
use rust_decimal::Decimal;
use std::str::FromStr;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CALLBACK_TOKEN: &str = "cb-token";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        env: Environment::Test,
        bind_addr: "127.0.0.1:0".parse().expect("bind addr"),
        log_level: "info".to_owned(),
        jwt_secret: "test-secret-that-is-long-enough-for-hs256".to_owned(),
        jwt_ttl_hours: 24,
        cors_origins: vec!["http://localhost:5173".to_owned()],
        static_dir: None,
        admin_email_domain: Some("lethashop.com".to_owned()),
        shipping: ShippingPolicy::default(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 2,
        mpesa: None,
        users_service: None,
    }
}

fn mpesa_config(base_url: &str) -> MpesaConfig {
    MpesaConfig {
        consumer_key: "consumer-key".to_owned(),
        consumer_secret: "consumer-secret".to_owned(),
        shortcode: "174379".to_owned(),
        passkey: "passkey".to_owned(),
        callback_url: "https://shop.example.com/api/payments/mpesa/callback".to_owned(),
        environment: MpesaEnvironment::Sandbox,
        base_url: Some(base_url.to_owned()),
        callback_token: Some(CALLBACK_TOKEN.to_owned()),
        request_timeout_secs: 5,
        payment_timeout_secs: 300,
    }
}

fn test_state(pool: sqlx::PgPool, config: AppConfig) -> AppState {
    let tokens = TokenService::new(&config.jwt_secret, config.jwt_ttl_hours);
    let mpesa = config.mpesa.as_ref().map(|m| {
        Arc::new(
            MpesaClient::new(m)
                .expect("mpesa client")
                .with_retry_policy(0, 0),
        )
    });
    AppState {
        pool,
        config: Arc::new(config),
        tokens,
        mpesa,
        users_service: None,
    }
}

fn test_app(pool: sqlx::PgPool) -> Router {
    build_app(test_state(pool, test_config()), default_rate_limit_state())
}

fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("json parse")
    };
    (status, json)
}

async fn sign_up(app: &Router, email: &str) -> String {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({
                "email": email,
                "password": "hunter22",
                "name": "Test Customer"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {json}");
    json["data"]["token"]
        .as_str()
        .expect("token in payload")
        .to_owned()
}

fn decimal(value: &serde_json::Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

async fn product_id(pool: &sqlx::PgPool, slug: &str) -> i64 {
    lethashop_db::get_published_product_by_slug(pool, slug)
        .await
        .expect("query product")
        .expect("seeded product")
        .id
}

/// Seeds the catalogue, signs up a customer and puts two desk pads in the cart.
async fn customer_with_cart(app: &Router, pool: &sqlx::PgPool) -> String {
    lethashop_db::seed_catalog(pool).await.expect("seed");
    let token = sign_up(app, "wanjiku@example.com").await;
    let desk_pad = product_id(pool, "desk-pad").await;
    let (status, _) = send(
        app,
        json_request(
            "POST",
            "/api/cart",
            Some(&token),
            Some(serde_json::json!({ "product_id": desk_pad, "quantity": 2 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    token
}

async fn place_order(app: &Router, token: &str) -> serde_json::Value {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/api/orders",
            Some(token),
            Some(serde_json::json!({
                "shipping_address": { "line1": "Moi Avenue 12", "city": "Nairobi", "country": "KE" },
                "customer_info": { "first_name": "Wanjiku", "phone": "0712345678" }
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "order failed: {json}");
    json["data"].clone()
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("unauthorized", StatusCode::UNAUTHORIZED),
        ("forbidden", StatusCode::FORBIDDEN),
        ("conflict", StatusCode::CONFLICT),
        ("bad_gateway", StatusCode::BAD_GATEWAY),
        ("service_unavailable", StatusCode::SERVICE_UNAVAILABLE),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, expected) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), expected, "code {code}");
    }
}

#[test]
fn empty_cart_maps_to_bad_request() {
    let err = map_db_error("req-1".to_owned(), &lethashop_db::DbError::EmptyCart);
    assert_eq!(err.error.code, "bad_request");
}

#[test]
fn payment_ledger_refusals_map_to_conflict() {
    for error in [
        lethashop_db::DbError::OrderNotPayable(7),
        lethashop_db::DbError::PaymentInProgress(7),
    ] {
        let err = map_db_error("req-1".to_owned(), &error);
        assert_eq!(err.error.code, "conflict");
        assert!(err.error.message.contains("order 7"));
    }
}

#[test]
fn non_empty_trims_and_drops_blank_values() {
    assert_eq!(non_empty(Some("  Nairobi ".to_owned())), Some("Nairobi".to_owned()));
    assert_eq!(non_empty(Some("   ".to_owned())), None);
    assert_eq!(non_empty(None), None);
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_database_ok(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, json) = send(&app, json_request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "ok");
}

#[sqlx::test(migrations = "../../migrations")]
async fn signup_sets_cookie_and_me_accepts_bearer_or_cookie(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "email": " Amina@Example.com ", "password": "hunter22" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("set-cookie header")
        .to_owned();
    assert!(set_cookie.starts_with("lethashop_session="));
    assert!(set_cookie.contains("HttpOnly"));

    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["data"]["user"]["email"], "amina@example.com");
    assert_eq!(json["data"]["user"]["role"], "user");
    let token = json["data"]["token"].as_str().expect("token").to_owned();

    let (status, json) = send(&app, json_request("GET", "/api/auth/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["email"], "amina@example.com");

    let cookie_pair = set_cookie.split(';').next().expect("cookie pair").to_owned();
    let request = Request::builder()
        .uri("/api/users/me")
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["email"], "amina@example.com");
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_signup_is_conflict(pool: sqlx::PgPool) {
    let app = test_app(pool);
    sign_up(&app, "otieno@example.com").await;
    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "email": "OTIENO@example.com", "password": "another1" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");
}

#[sqlx::test(migrations = "../../migrations")]
async fn signup_with_shop_domain_becomes_admin(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let token = sign_up(&app, "staff@lethashop.com").await;
    let (_, json) = send(&app, json_request("GET", "/api/auth/me", Some(&token), None)).await;
    assert_eq!(json["data"]["role"], "admin");
}

#[sqlx::test(migrations = "../../migrations")]
async fn short_password_is_rejected(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "email": "kip@example.com", "password": "12345" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../migrations")]
async fn signin_with_wrong_password_is_unauthorized(pool: sqlx::PgPool) {
    let app = test_app(pool);
    sign_up(&app, "njeri@example.com").await;
    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/signin",
            None,
            Some(serde_json::json!({ "email": "njeri@example.com", "password": "wrong-pass" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["message"], "invalid email or password");

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/signin",
            None,
            Some(serde_json::json!({ "email": "njeri@example.com", "password": "hunter22" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["token"].is_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn cart_requires_authentication(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, _) = send(&app, json_request("GET", "/api/cart", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, json_request("GET", "/api/cart", Some("not-a-jwt"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn customers_cannot_reach_admin_routes(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let token = sign_up(&app, "customer@example.com").await;
    let (status, json) = send(
        &app,
        json_request("GET", "/api/admin/orders", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "forbidden");
}

#[sqlx::test(migrations = "../../migrations")]
async fn oauth_routes_report_unconfigured_service(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, _) = send(
        &app,
        json_request("GET", "/api/oauth/google/redirect_url", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ---------------------------------------------------------------------------
// Catalogue and cart
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn product_listing_honours_filters(pool: sqlx::PgPool) {
    lethashop_db::seed_catalog(&pool).await.expect("seed");
    let app = test_app(pool);

    let (status, json) = send(
        &app,
        json_request("GET", "/api/products?featured=true", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let featured = json["data"].as_array().expect("array");
    assert!(!featured.is_empty());
    assert!(featured.iter().all(|p| p["is_featured"] == true));

    let (_, categories) = send(&app, json_request("GET", "/api/categories", None, None)).await;
    let bags_id = categories["data"]
        .as_array()
        .expect("array")
        .iter()
        .find(|c| c["slug"] == "bags")
        .expect("bags category")["id"]
        .clone();

    let (_, json) = send(
        &app,
        json_request("GET", "/api/products?category=bags", None, None),
    )
    .await;
    let bags = json["data"].as_array().expect("array");
    assert!(!bags.is_empty());
    assert!(bags.iter().all(|p| p["category_id"] == bags_id));

    let (status, _) = send(
        &app,
        json_request("GET", "/api/products/no-such-product", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cart_totals_include_flat_shipping_below_threshold(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let token = customer_with_cart(&app, &pool).await;

    let (status, json) = send(&app, json_request("GET", "/api/cart", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let cart = &json["data"];
    assert_eq!(cart["item_count"], 2);
    assert_eq!(decimal(&cart["subtotal"]), Decimal::new(130, 0));
    assert_eq!(decimal(&cart["shipping"]), Decimal::new(15, 0));
    assert_eq!(decimal(&cart["total"]), Decimal::new(145, 0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn zero_quantity_is_rejected(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let token = customer_with_cart(&app, &pool).await;
    let desk_pad = product_id(&pool, "desk-pad").await;

    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/cart/{desk_pad}"),
            Some(&token),
            Some(serde_json::json!({ "quantity": 0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Orders and payments
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn order_is_priced_from_the_cart(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let token = customer_with_cart(&app, &pool).await;

    let order = place_order(&app, &token).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(decimal(&order["total"]), Decimal::new(145, 0));
    assert_eq!(order["items"].as_array().expect("items").len(), 1);
    assert_eq!(order["customer"]["email"], "wanjiku@example.com");

    let other = sign_up(&app, "someone-else@example.com").await;
    let id = order["id"].as_i64().expect("id");
    let (status, _) = send(
        &app,
        json_request("GET", &format!("/api/orders/{id}"), Some(&other), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_from_empty_cart_is_bad_request(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let token = sign_up(&app, "empty@example.com").await;
    let (status, json) = send(
        &app,
        json_request("POST", "/api/orders", Some(&token), Some(serde_json::json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["message"], "cart is empty");
}

#[sqlx::test(migrations = "../../migrations")]
async fn stk_push_without_mpesa_is_unavailable(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let token = customer_with_cart(&app, &pool).await;
    let order = place_order(&app, &token).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/payments/mpesa/stkpush",
            Some(&token),
            Some(serde_json::json!({ "order_id": order["id"], "phone_number": "0712345678" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[sqlx::test(migrations = "../../migrations")]
async fn successful_callback_marks_order_paid(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-abc",
            "expires_in": "3599"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_TEST_0001",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.mpesa = Some(mpesa_config(&server.uri()));
    let app = build_app(test_state(pool.clone(), config), default_rate_limit_state());

    let token = customer_with_cart(&app, &pool).await;
    let order = place_order(&app, &token).await;
    let order_id = order["id"].as_i64().expect("id");

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/payments/mpesa/stkpush",
            Some(&token),
            Some(serde_json::json!({ "order_id": order_id, "phone_number": "0712 345 678" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "stk push failed: {json}");
    assert_eq!(json["data"]["checkout_request_id"], "ws_CO_TEST_0001");
    assert_eq!(json["data"]["amount"], 145);
    assert_eq!(json["data"]["status"], "pending");

    let callback = serde_json::json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_TEST_0001",
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
            "CallbackMetadata": { "Item": [
                { "Name": "Amount", "Value": 145 },
                { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                { "Name": "PhoneNumber", "Value": 254_712_345_678_u64 }
            ]}
        }}
    });
    let (status, json) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/payments/mpesa/callback?token={CALLBACK_TOKEN}"),
            None,
            Some(callback.clone()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ResultCode"], 0);

    let (status, json) = send(
        &app,
        json_request(
            "GET",
            &format!("/api/orders/{order_id}/status"),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "paid");
    assert_eq!(json["data"]["payment_status"], "completed");
    assert_eq!(json["data"]["mpesa_receipt_number"], "NLJ7RT61SV");

    let (_, cart) = send(&app, json_request("GET", "/api/cart", Some(&token), None)).await;
    assert_eq!(cart["data"]["item_count"], 0);

    // A repeated callback is acknowledged and changes nothing.
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/payments/mpesa/callback?token={CALLBACK_TOKEN}"),
            None,
            Some(callback),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/payments/mpesa/stkpush",
            Some(&token),
            Some(serde_json::json!({ "order_id": order_id, "phone_number": "0712345678" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../migrations")]
async fn callback_with_wrong_token_is_rejected(pool: sqlx::PgPool) {
    let mut config = test_config();
    config.mpesa = Some(mpesa_config("http://127.0.0.1:9"));
    let app = build_app(test_state(pool, config), default_rate_limit_state());

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/payments/mpesa/callback?token=guess",
            None,
            Some(serde_json::json!({ "Body": {} })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn malformed_callback_is_still_acknowledged(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/payments/mpesa/callback",
            None,
            Some(serde_json::json!({ "unexpected": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ResultDesc"], "Accepted");
}

#[sqlx::test(migrations = "../../migrations")]
async fn non_json_callback_is_still_acknowledged(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/mpesa/callback")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("<html>gateway hiccup</html>"))
        .expect("request");

    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ResultCode"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_push_while_first_is_pending_is_conflict(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-abc",
            "expires_in": "3599"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "MerchantRequestID": "29115-34620561-2",
            "CheckoutRequestID": "ws_CO_TEST_0002",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.mpesa = Some(mpesa_config(&server.uri()));
    let app = build_app(test_state(pool.clone(), config), default_rate_limit_state());

    let token = customer_with_cart(&app, &pool).await;
    let order = place_order(&app, &token).await;
    let push = serde_json::json!({ "order_id": order["id"], "phone_number": "0712345678" });

    let (status, json) = send(
        &app,
        json_request("POST", "/api/payments/mpesa/stkpush", Some(&token), Some(push.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "first push failed: {json}");

    let (status, json) = send(
        &app,
        json_request("POST", "/api/payments/mpesa/stkpush", Some(&token), Some(push)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");
}

#[sqlx::test(migrations = "../../migrations")]
async fn cart_total_matches_checkout_after_unpublish(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let token = customer_with_cart(&app, &pool).await;
    let tote = product_id(&pool, "everyday-tote").await;
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/cart",
            Some(&token),
            Some(serde_json::json!({ "product_id": tote, "quantity": 1 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    sqlx::query("UPDATE products SET is_published = false WHERE id = $1")
        .bind(tote)
        .execute(&pool)
        .await
        .expect("unpublish tote");

    let (status, json) = send(&app, json_request("GET", "/api/cart", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let cart = &json["data"];
    assert_eq!(cart["item_count"], 2);
    assert_eq!(decimal(&cart["total"]), Decimal::new(145, 0));

    let order = place_order(&app, &token).await;
    assert_eq!(decimal(&order["total"]), decimal(&cart["total"]));
}

// ---------------------------------------------------------------------------
// Static SPA
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn spa_deep_links_serve_index_with_ok(pool: sqlx::PgPool) {
    let dir = std::env::temp_dir().join(format!("lethashop-spa-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("assets")).expect("create static dir");
    std::fs::write(dir.join("index.html"), "<div id=\"root\"></div>").expect("write index");
    std::fs::write(dir.join("assets/app.js"), "console.log(1)").expect("write asset");

    let mut config = test_config();
    config.static_dir = Some(dir.clone());
    let app = build_app(test_state(pool, config), default_rate_limit_state());

    for (uri, expected) in [
        ("/orders/42", "<div id=\"root\"></div>"),
        ("/", "<div id=\"root\"></div>"),
        ("/assets/app.js", "console.log(1)"),
    ] {
        let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert_eq!(body, expected.as_bytes(), "{uri}");
    }

    let (status, _) = send(&app, json_request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);

    std::fs::remove_dir_all(&dir).ok();
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn admin_rejects_unknown_order_status(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let customer = customer_with_cart(&app, &pool).await;
    let order = place_order(&app, &customer).await;
    let admin = sign_up(&app, "ops@lethashop.com").await;
    let id = order["id"].as_i64().expect("id");

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/admin/orders/{id}/status"),
            Some(&admin),
            Some(serde_json::json!({ "status": "teleported" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/admin/orders/{id}/status"),
            Some(&admin),
            Some(serde_json::json!({ "status": "shipped" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "shipped");
}

#[sqlx::test(migrations = "../../migrations")]
async fn admin_creates_product_with_generated_slug(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let admin = sign_up(&app, "catalog@lethashop.com").await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/admin/products",
            Some(&admin),
            Some(serde_json::json!({
                "name": "Hand-Stitched Card Holder",
                "price": "24.50",
                "inventory_quantity": 12
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
    assert_eq!(json["data"]["slug"], "hand-stitched-card-holder");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/admin/products",
            Some(&admin),
            Some(serde_json::json!({
                "name": "Orphan",
                "price": "10.00",
                "category_id": 999_999
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../migrations")]
async fn admin_cannot_deactivate_themselves(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let admin = sign_up(&app, "root@lethashop.com").await;
    let (_, me) = send(&app, json_request("GET", "/api/auth/me", Some(&admin), None)).await;
    let id = me["data"]["id"].as_str().expect("id").to_owned();

    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/admin/users/{id}/status"),
            Some(&admin),
            Some(serde_json::json!({ "is_active": false })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
