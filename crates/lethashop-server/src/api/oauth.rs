//! Sign-in through the external users service.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use lethashop_users::{UsersServiceClient, UsersServiceError};
use serde::{Deserialize, Serialize};

use crate::auth::{cleared_cookie, upstream_session_cookie, SESSION_COOKIE, UPSTREAM_SESSION_COOKIE};
use crate::middleware::RequestId;

use super::auth::{normalize_email, start_session, AuthPayload};
use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CreateSessionRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub(super) struct RedirectUrlItem {
    redirect_url: String,
}

fn users_service(state: &AppState, request_id: &str) -> Result<Arc<UsersServiceClient>, ApiError> {
    state.users_service.clone().ok_or_else(|| {
        ApiError::new(
            request_id,
            "service_unavailable",
            "OAuth sign-in is not configured",
        )
    })
}

fn map_users_service_error(request_id: &str, error: &UsersServiceError) -> ApiError {
    match error {
        UsersServiceError::Unauthorized => {
            ApiError::new(request_id, "unauthorized", "sign-in was rejected by the provider")
        }
        UsersServiceError::InvalidProvider(provider) => ApiError::new(
            request_id,
            "bad_request",
            format!("unsupported provider '{provider}'"),
        ),
        other => {
            tracing::warn!(error = %other, "users service request failed");
            ApiError::new(request_id, "bad_gateway", "users service unavailable")
        }
    }
}

/// GET /api/oauth/{provider}/redirect_url
pub(super) async fn redirect_url(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(provider): Path<String>,
) -> Result<Json<ApiResponse<RedirectUrlItem>>, ApiError> {
    let rid = &req_id.0;
    let client = users_service(&state, rid)?;
    let redirect_url = client
        .redirect_url(&provider)
        .await
        .map_err(|e| map_users_service_error(rid, &e))?;

    Ok(Json(ApiResponse::new(
        RedirectUrlItem { redirect_url },
        req_id.0,
    )))
}

/// POST /api/sessions
///
/// Exchanges the provider code, links the upstream account to a local user
/// by email and starts a local session.
pub(super) async fn create_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    jar: CookieJar,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthPayload>>), ApiError> {
    let rid = &req_id.0;
    let client = users_service(&state, rid)?;

    let code = body.code.trim();
    if code.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "code is required"));
    }

    let session_token = client
        .exchange_code(code)
        .await
        .map_err(|e| map_users_service_error(rid, &e))?;
    let upstream = client
        .current_user(&session_token)
        .await
        .map_err(|e| map_users_service_error(rid, &e))?;

    let email = normalize_email(rid, &upstream.email)?;
    let role = lethashop_core::role_for_new_account(
        &email,
        state.config.admin_email_domain.as_deref(),
    );
    let user = lethashop_db::upsert_oauth_user(
        &state.pool,
        &email,
        upstream.display_name(),
        upstream.avatar_url(),
        role,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !user.is_active {
        return Err(ApiError::new(rid, "unauthorized", "account is disabled"));
    }

    tracing::info!(user_id = %user.id, upstream_id = %upstream.id, "oauth session created");
    let jar = jar.add(upstream_session_cookie(session_token));
    let (jar, payload) = start_session(&state, rid, jar, user)?;
    Ok((jar, Json(ApiResponse::new(payload, req_id.0))))
}

/// GET /api/logout
///
/// Revocation failures are logged and do not block clearing the cookies.
pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<serde_json::Value>>) {
    let upstream_token = jar
        .get(UPSTREAM_SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty());

    if let (Some(token), Some(client)) = (upstream_token, state.users_service.as_ref()) {
        if let Err(e) = client.delete_session(&token).await {
            tracing::warn!(error = %e, "failed to revoke upstream session");
        }
    }

    let jar = jar
        .add(cleared_cookie(SESSION_COOKIE))
        .add(cleared_cookie(UPSTREAM_SESSION_COOKIE));
    (
        jar,
        Json(ApiResponse::new(
            serde_json::json!({ "logged_out": true }),
            req_id.0,
        )),
    )
}
