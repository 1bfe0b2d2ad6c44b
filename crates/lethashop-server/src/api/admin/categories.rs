use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::super::catalog::CategoryItem;
use super::super::{map_db_error, non_empty, ApiError, ApiResponse, AppState};
use super::{ensure_category_exists, resolve_slug};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub sort_order: i32,
}

fn category_input(
    request_id: &str,
    body: CategoryRequest,
) -> Result<lethashop_db::CategoryInput, ApiError> {
    let name = body.name.trim().to_owned();
    if name.is_empty() {
        return Err(ApiError::new(request_id, "validation_error", "name is required"));
    }
    let slug = resolve_slug(request_id, body.slug.as_deref(), &name)?;
    Ok(lethashop_db::CategoryInput {
        name,
        slug,
        description: non_empty(body.description),
        parent_id: body.parent_id,
        sort_order: body.sort_order,
    })
}

fn map_category_write_error(request_id: &str, e: &lethashop_db::DbError) -> ApiError {
    if e.is_unique_violation() {
        return ApiError::new(request_id, "conflict", "a category with that slug already exists");
    }
    map_db_error(request_id.to_owned(), e)
}

/// GET /api/admin/categories
pub(in crate::api) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<CategoryItem>>>, ApiError> {
    let rows = lethashop_db::list_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(CategoryItem::from).collect(),
        req_id.0,
    )))
}

/// POST /api/admin/categories
pub(in crate::api) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryItem>>), ApiError> {
    let rid = &req_id.0;
    let input = category_input(rid, body)?;
    ensure_category_exists(&state.pool, rid, input.parent_id).await?;

    let row = lethashop_db::create_category(&state.pool, &input)
        .await
        .map_err(|e| map_category_write_error(rid, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(row.into(), req_id.0)),
    ))
}

/// PUT /api/admin/categories/{id}
pub(in crate::api) async fn update_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<CategoryRequest>,
) -> Result<Json<ApiResponse<CategoryItem>>, ApiError> {
    let rid = &req_id.0;
    let input = category_input(rid, body)?;
    if input.parent_id == Some(id) {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "a category cannot be its own parent",
        ));
    }
    ensure_category_exists(&state.pool, rid, input.parent_id).await?;

    let row = lethashop_db::update_category(&state.pool, id, &input)
        .await
        .map_err(|e| map_category_write_error(rid, &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("category {id} not found")))?;

    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}

/// DELETE /api/admin/categories/{id}
///
/// Products in the category are kept and become uncategorised.
pub(in crate::api) async fn delete_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = lethashop_db::delete_category(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !deleted {
        return Err(ApiError::new(rid, "not_found", format!("category {id} not found")));
    }

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "deleted": true }),
        req_id.0,
    )))
}
