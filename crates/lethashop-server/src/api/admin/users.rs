use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId};

use super::super::auth::UserItem;
use super::super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateUserStatusRequest {
    pub is_active: bool,
}

/// GET /api/admin/users
pub(in crate::api) async fn list_users(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<UserItem>>>, ApiError> {
    let rows = lethashop_db::list_users(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(UserItem::from).collect(),
        req_id.0,
    )))
}

/// PUT /api/admin/users/{id}/status
pub(in crate::api) async fn update_user_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserStatusRequest>,
) -> Result<Json<ApiResponse<UserItem>>, ApiError> {
    let rid = &req_id.0;
    if id == admin.id && !body.is_active {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "admins cannot deactivate their own account",
        ));
    }

    let row = lethashop_db::set_user_active(&state.pool, id, body.is_active)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("user {id} not found")))?;

    tracing::info!(user_id = %id, is_active = body.is_active, "user status updated");
    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}
