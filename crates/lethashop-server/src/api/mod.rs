mod admin;
mod auth;
mod cart;
mod catalog;
mod oauth;
mod orders;
mod payments;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use lethashop_core::AppConfig;
use lethashop_mpesa::MpesaClient;
use lethashop_users::UsersServiceClient;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::auth::TokenService;
use crate::middleware::{
    enforce_rate_limit, request_id, require_admin, require_user, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    /// `None` when the `MPESA_*` group is not configured.
    pub mpesa: Option<Arc<MpesaClient>>,
    pub users_service: Option<Arc<UsersServiceClient>>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(crate) fn map_db_error(request_id: String, error: &lethashop_db::DbError) -> ApiError {
    match error {
        lethashop_db::DbError::EmptyCart => {
            ApiError::new(request_id, "bad_request", "cart is empty")
        }
        e @ (lethashop_db::DbError::OrderNotPayable(_)
        | lethashop_db::DbError::PaymentInProgress(_)) => {
            ApiError::new(request_id, "conflict", e.to_string())
        }
        e if e.is_unique_violation() => {
            ApiError::new(request_id, "conflict", "a record with that value already exists")
        }
        e if e.is_foreign_key_violation() => ApiError::new(
            request_id,
            "validation_error",
            "referenced record does not exist",
        ),
        e => {
            tracing::error!(error = %e, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

fn internal_error(request_id: &str, error: &impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %error, "internal error");
    ApiError::new(request_id, "internal_error", "internal error")
}

/// Parse a URL and convert parse failures into a standardized validation error.
pub(super) fn parse_url_or_validation_error(
    request_id: &str,
    field: &str,
    value: &str,
) -> Result<reqwest::Url, ApiError> {
    reqwest::Url::parse(value).map_err(|_| {
        ApiError::new(
            request_id,
            "validation_error",
            format!("'{field}' must be a valid URL, got '{value}'"),
        )
    })
}

/// Trims and drops empty strings.
pub(super) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn public_router(rate_limit: RateLimitState) -> Router<AppState> {
    let credential_routes = Router::new()
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/signin", post(auth::sign_in))
        .route("/api/sessions", post(oauth::create_session))
        .route_layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/categories", get(catalog::list_categories))
        .route("/api/products", get(catalog::list_products))
        .route("/api/products/{slug}", get(catalog::get_product))
        .route(
            "/api/oauth/{provider}/redirect_url",
            get(oauth::redirect_url),
        )
        .route("/api/logout", get(oauth::logout))
        .route("/api/payments/mpesa/callback", post(payments::mpesa_callback))
        .merge(credential_routes)
}

fn user_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/me", get(auth::me))
        .route("/api/auth/signout", post(auth::sign_out))
        .route("/api/auth/profile", put(auth::update_profile))
        .route(
            "/api/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .delete(cart::clear_cart),
        )
        .route("/api/cart/add", post(cart::add_to_cart))
        .route(
            "/api/cart/{product_id}",
            put(cart::update_quantity).delete(cart::remove_item),
        )
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/orders/{id}/status", get(orders::get_order_status))
        .route("/api/payments/mpesa/stkpush", post(payments::stk_push))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ))
}

fn admin_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/api/admin/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route(
            "/api/admin/categories",
            get(admin::list_categories).post(admin::create_category),
        )
        .route(
            "/api/admin/categories/{id}",
            put(admin::update_category).delete(admin::delete_category),
        )
        .route("/api/admin/orders", get(admin::list_orders))
        .route(
            "/api/admin/orders/{id}/status",
            put(admin::update_order_status),
        )
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{id}/status",
            put(admin::update_user_status),
        )
        .route_layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    require_user,
                ))
                .layer(axum::middleware::from_fn(require_admin)),
        )
}

/// SPA assets with `index.html` for client-side routes.
fn spa_service(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let mut router = Router::new()
        .merge(public_router(rate_limit))
        .merge(user_router(&state))
        .merge(admin_router(&state));

    if let Some(dir) = state.config.static_dir.as_deref() {
        router = router.fallback_service(spa_service(dir));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors(&state.config.cors_origins))
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match lethashop_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

/// Budget for sign-up, sign-in and OAuth session creation.
pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(60, Duration::from_secs(60))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
