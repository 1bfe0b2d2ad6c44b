//! Email/password accounts and the current-user endpoints.

use axum::{extract::State, http::StatusCode, Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{
    cleared_cookie, hash_password, session_cookie, verify_password, SESSION_COOKIE,
};
use crate::middleware::{CurrentUser, RequestId};

use super::{
    internal_error, map_db_error, non_empty, parse_url_or_validation_error, ApiError,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct UserItem {
    id: Uuid,
    email: String,
    name: Option<String>,
    avatar_url: Option<String>,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<lethashop_db::UserRow> for UserItem {
    fn from(row: lethashop_db::UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            avatar_url: row.avatar_url,
            role: row.role,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct AuthPayload {
    user: UserItem,
    token: String,
}

/// Lowercased, trimmed email, or a validation error.
pub(in crate::api) fn normalize_email(request_id: &str, raw: &str) -> Result<String, ApiError> {
    lethashop_core::normalize_email(raw).map_err(|_| {
        ApiError::new(
            request_id,
            "validation_error",
            "a valid email address is required",
        )
    })
}

/// Issues a JWT for `user` and adds the session cookie to `jar`.
pub(in crate::api) fn start_session(
    state: &AppState,
    request_id: &str,
    jar: CookieJar,
    user: lethashop_db::UserRow,
) -> Result<(CookieJar, AuthPayload), ApiError> {
    let token = state
        .tokens
        .issue(user.id, &user.role)
        .map_err(|e| internal_error(request_id, &e))?;
    let jar = jar.add(session_cookie(token.clone(), state.tokens.ttl()));
    Ok((
        jar,
        AuthPayload {
            user: user.into(),
            token,
        },
    ))
}

/// POST /api/auth/signup
pub(super) async fn sign_up(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    jar: CookieJar,
    Json(body): Json<SignUpRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse<AuthPayload>>), ApiError> {
    let rid = &req_id.0;
    let email = normalize_email(rid, &body.email)?;
    lethashop_core::validate_password(&body.password)
        .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?;
    let name = non_empty(body.name);

    let password_hash = hash_password(body.password)
        .await
        .map_err(|e| internal_error(rid, &e))?;
    let role = lethashop_core::role_for_new_account(
        &email,
        state.config.admin_email_domain.as_deref(),
    );

    let user = lethashop_db::create_user(
        &state.pool,
        lethashop_db::NewUser {
            email: &email,
            password_hash: Some(&password_hash),
            name: name.as_deref(),
            avatar_url: None,
            role,
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            ApiError::new(rid, "conflict", "an account with that email already exists")
        } else {
            map_db_error(rid.clone(), &e)
        }
    })?;

    tracing::info!(user_id = %user.id, role = %user.role, "account created");
    let (jar, payload) = start_session(&state, rid, jar, user)?;
    Ok((
        StatusCode::CREATED,
        jar,
        Json(ApiResponse::new(payload, req_id.0)),
    ))
}

/// POST /api/auth/signin
pub(super) async fn sign_in(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    jar: CookieJar,
    Json(body): Json<SignInRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthPayload>>), ApiError> {
    let rid = &req_id.0;
    let invalid = || ApiError::new(rid, "unauthorized", "invalid email or password");

    let email = body.email.trim().to_lowercase();
    let credentials = lethashop_db::get_user_credentials_by_email(&state.pool, &email)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(invalid)?;

    // OAuth-only accounts have no password to check.
    let Some(stored_hash) = credentials.password_hash else {
        return Err(invalid());
    };
    let matched = verify_password(body.password, stored_hash)
        .await
        .map_err(|e| internal_error(rid, &e))?;
    if !matched {
        return Err(invalid());
    }

    let (jar, payload) = start_session(&state, rid, jar, credentials.user)?;
    Ok((jar, Json(ApiResponse::new(payload, req_id.0))))
}

/// GET /api/auth/me and /api/users/me
pub(super) async fn me(
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<ApiResponse<UserItem>> {
    Json(ApiResponse::new(user.into(), req_id.0))
}

/// POST /api/auth/signout
pub(super) async fn sign_out(
    Extension(req_id): Extension<RequestId>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<serde_json::Value>>) {
    (
        jar.add(cleared_cookie(SESSION_COOKIE)),
        Json(ApiResponse::new(
            serde_json::json!({ "signed_out": true }),
            req_id.0,
        )),
    )
}

/// PUT /api/auth/profile
pub(super) async fn update_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserItem>>, ApiError> {
    let rid = &req_id.0;
    let name = non_empty(body.name);
    let avatar_url = non_empty(body.avatar_url);
    if name.is_none() && avatar_url.is_none() {
        return Err(ApiError::new(rid, "bad_request", "nothing to update"));
    }
    if let Some(ref url) = avatar_url {
        parse_url_or_validation_error(rid, "avatar_url", url)?;
    }

    let updated = lethashop_db::update_user_profile(
        &state.pool,
        user.id,
        name.as_deref(),
        avatar_url.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?
    .ok_or_else(|| ApiError::new(rid, "not_found", "user not found"))?;

    Ok(Json(ApiResponse::new(updated.into(), req_id.0)))
}
