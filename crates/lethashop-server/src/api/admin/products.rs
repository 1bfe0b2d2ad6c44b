use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::super::catalog::ProductItem;
use super::super::{
    map_db_error, non_empty, parse_url_or_validation_error, ApiError, ApiResponse, AppState,
};
use super::{ensure_category_exists, resolve_slug};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Full product representation for create and update.
#[derive(Debug, Deserialize)]
pub(in crate::api) struct ProductRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    #[serde(default)]
    pub inventory_quantity: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub gallery_images: Vec<String>,
    pub materials: Option<String>,
    pub care_instructions: Option<String>,
    pub category_id: Option<i64>,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(default)]
    pub is_featured: bool,
}

fn default_published() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validation(request_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

/// Checks field rules and builds the row to write. Category existence is
/// checked separately because it needs the database.
fn validate_product(
    request_id: &str,
    body: ProductRequest,
) -> Result<lethashop_db::ProductInput, ApiError> {
    let name = body.name.trim().to_owned();
    if name.is_empty() {
        return Err(validation(request_id, "name is required"));
    }
    if body.price <= Decimal::ZERO {
        return Err(validation(request_id, "price must be positive"));
    }
    if body.compare_at_price.is_some_and(|p| p <= Decimal::ZERO) {
        return Err(validation(request_id, "compare_at_price must be positive"));
    }
    if body.inventory_quantity < 0 {
        return Err(validation(request_id, "inventory_quantity must be at least 0"));
    }

    let image_url = non_empty(body.image_url);
    if let Some(ref url) = image_url {
        parse_url_or_validation_error(request_id, "image_url", url)?;
    }
    for url in &body.gallery_images {
        parse_url_or_validation_error(request_id, "gallery_images", url)?;
    }

    let slug = resolve_slug(request_id, body.slug.as_deref(), &name)?;

    Ok(lethashop_db::ProductInput {
        name,
        slug,
        description: non_empty(body.description),
        price: body.price,
        compare_at_price: body.compare_at_price,
        sku: non_empty(body.sku),
        inventory_quantity: body.inventory_quantity,
        image_url,
        gallery_images: serde_json::Value::from(body.gallery_images),
        materials: non_empty(body.materials),
        care_instructions: non_empty(body.care_instructions),
        category_id: body.category_id,
        is_published: body.is_published,
        is_featured: body.is_featured,
    })
}

fn map_product_write_error(request_id: &str, e: &lethashop_db::DbError) -> ApiError {
    if e.is_unique_violation() {
        return ApiError::new(
            request_id,
            "conflict",
            "a product with that slug or SKU already exists",
        );
    }
    map_db_error(request_id.to_owned(), e)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/admin/products (including unpublished)
pub(in crate::api) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = lethashop_db::list_all_products(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(ProductItem::from).collect(),
        req_id.0,
    )))
}

/// POST /api/admin/products
pub(in crate::api) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductItem>>), ApiError> {
    let rid = &req_id.0;
    let input = validate_product(rid, body)?;
    ensure_category_exists(&state.pool, rid, input.category_id).await?;

    let row = lethashop_db::create_product(&state.pool, &input)
        .await
        .map_err(|e| map_product_write_error(rid, &e))?;

    tracing::info!(product_id = row.id, slug = %row.slug, "product created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(row.into(), req_id.0)),
    ))
}

/// PUT /api/admin/products/{id}
pub(in crate::api) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let rid = &req_id.0;
    let input = validate_product(rid, body)?;
    ensure_category_exists(&state.pool, rid, input.category_id).await?;

    let row = lethashop_db::update_product(&state.pool, id, &input)
        .await
        .map_err(|e| map_product_write_error(rid, &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("product {id} not found")))?;

    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}

/// DELETE /api/admin/products/{id}
pub(in crate::api) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = lethashop_db::delete_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !deleted {
        return Err(ApiError::new(rid, "not_found", format!("product {id} not found")));
    }

    tracing::info!(product_id = id, "product deleted");
    Ok(Json(ApiResponse::new(
        serde_json::json!({ "deleted": true }),
        req_id.0,
    )))
}
