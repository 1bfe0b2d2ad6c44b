use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::SESSION_COOKIE;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The authenticated caller, stored as a request extension by [`require_user`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub lethashop_db::UserRow);

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter shared by the credential endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(|| "unknown".to_owned(), |id| id.0.clone())
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Resolves the caller from a bearer token or the session cookie.
///
/// Missing, invalid or expired tokens, deleted users and deactivated users
/// all get `401`.
pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let rid = request_id_of(&req);

    let Some(token) = session_token(req.headers()) else {
        return ApiError::new(rid, "unauthorized", "authentication required").into_response();
    };

    let claims = match state.tokens.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "rejected session token");
            return ApiError::new(rid, "unauthorized", "invalid or expired session")
                .into_response();
        }
    };

    let user = match lethashop_db::get_user_by_id(&state.pool, claims.sub).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => {
            return ApiError::new(rid, "unauthorized", "account not found or disabled")
                .into_response();
        }
        Err(e) => return crate::api::map_db_error(rid, &e).into_response(),
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// Rejects non-admin callers. Must run after [`require_user`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    let is_admin = req
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|user| user.0.is_admin());

    if is_admin {
        next.run(req).await
    } else {
        ApiError::new(request_id_of(&req), "forbidden", "admin access required").into_response()
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        tracing::warn!("credential endpoint rate limit exceeded");
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

/// The bearer token wins over the cookie when both are present.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers.get(AUTHORIZATION)) {
        return Some(token.to_owned());
    }
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}
