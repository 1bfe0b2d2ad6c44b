use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(in crate::api) struct CategoryItem {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<i64>,
    sort_order: i32,
    created_at: DateTime<Utc>,
}

impl From<lethashop_db::CategoryRow> for CategoryItem {
    fn from(row: lethashop_db::CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            parent_id: row.parent_id,
            sort_order: row.sort_order,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct ProductItem {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    sku: Option<String>,
    inventory_quantity: i32,
    image_url: Option<String>,
    gallery_images: serde_json::Value,
    materials: Option<String>,
    care_instructions: Option<String>,
    category_id: Option<i64>,
    category_name: Option<String>,
    is_published: bool,
    is_featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<lethashop_db::ProductRow> for ProductItem {
    fn from(row: lethashop_db::ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            compare_at_price: row.compare_at_price,
            sku: row.sku,
            inventory_quantity: row.inventory_quantity,
            image_url: row.image_url,
            gallery_images: row.gallery_images,
            materials: row.materials,
            care_instructions: row.care_instructions,
            category_id: row.category_id,
            category_name: row.category_name,
            is_published: row.is_published,
            is_featured: row.is_featured,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub category: Option<String>,
    pub featured: Option<String>,
}

/// GET /api/categories
pub(super) async fn list_categories(
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

/// GET /api/products?category=&featured=true
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let category_slug = query.category.as_deref().filter(|s| !s.is_empty());
    let rows = lethashop_db::list_published_products(
        &state.pool,
        lethashop_db::ProductFilters {
            category_slug,
            featured_only: query.featured.as_deref() == Some("true"),
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(ProductItem::from).collect(),
        req_id.0,
    )))
}

/// GET /api/products/{slug}
pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let rid = &req_id.0;
    let row = lethashop_db::get_published_product_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("product '{slug}' not found")))?;

    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}
