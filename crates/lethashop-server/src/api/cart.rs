//! The caller's shopping cart.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use lethashop_core::{OrderTotals, PricedLine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::{CurrentUser, RequestId};

use super::{map_db_error, non_empty, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct AddToCartRequest {
    pub product_id: i64,
    pub quantity: Option<i32>,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub(super) struct CartLineItem {
    id: i64,
    product_id: i64,
    product_name: String,
    product_slug: String,
    price: Decimal,
    image_url: Option<String>,
    quantity: i32,
    size: Option<String>,
    color: Option<String>,
    line_total: Decimal,
}

impl From<lethashop_db::CartItemRow> for CartLineItem {
    fn from(row: lethashop_db::CartItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            line_total: row.price * Decimal::from(row.quantity),
            product_name: row.product_name,
            product_slug: row.product_slug,
            price: row.price,
            image_url: row.image_url,
            quantity: row.quantity,
            size: row.size,
            color: row.color,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CartSummary {
    items: Vec<CartLineItem>,
    subtotal: Decimal,
    shipping: Decimal,
    total: Decimal,
    item_count: i64,
}

fn validate_quantity(request_id: &str, quantity: i32) -> Result<(), ApiError> {
    if quantity >= 1 {
        Ok(())
    } else {
        Err(ApiError::new(
            request_id,
            "validation_error",
            "quantity must be at least 1",
        ))
    }
}

/// GET /api/cart
pub(super) async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<CartSummary>>, ApiError> {
    let rows = lethashop_db::list_cart_items(&state.pool, user.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let lines: Vec<PricedLine> = rows
        .iter()
        .map(|row| PricedLine {
            unit_price: row.price,
            quantity: row.quantity,
        })
        .collect();
    let totals = OrderTotals::compute(&lines, &state.config.shipping);
    let item_count = rows.iter().map(|row| i64::from(row.quantity)).sum();

    Ok(Json(ApiResponse::new(
        CartSummary {
            items: rows.into_iter().map(CartLineItem::from).collect(),
            subtotal: totals.subtotal,
            shipping: totals.shipping,
            total: totals.total,
            item_count,
        },
        req_id.0,
    )))
}

/// POST /api/cart and /api/cart/add
///
/// Adding a product already in the cart increases its quantity.
pub(super) async fn add_to_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<AddToCartRequest>,
) -> Result<Json<ApiResponse<CartLineItem>>, ApiError> {
    let rid = &req_id.0;
    let quantity = body.quantity.unwrap_or(1);
    validate_quantity(rid, quantity)?;

    lethashop_db::get_published_product(&state.pool, body.product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "product not found"))?;

    let size = non_empty(body.size);
    let color = non_empty(body.color);
    let row = lethashop_db::add_to_cart(
        &state.pool,
        user.id,
        body.product_id,
        quantity,
        size.as_deref(),
        color.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}

/// PUT /api/cart/{product_id}
pub(super) async fn update_quantity(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(product_id): Path<i64>,
    Json(body): Json<UpdateQuantityRequest>,
) -> Result<Json<ApiResponse<CartLineItem>>, ApiError> {
    let rid = &req_id.0;
    validate_quantity(rid, body.quantity)?;

    let row = lethashop_db::set_cart_quantity(&state.pool, user.id, product_id, body.quantity)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "product is not in the cart"))?;

    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}

/// DELETE /api/cart/{product_id}
pub(super) async fn remove_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let removed = lethashop_db::remove_cart_item(&state.pool, user.id, product_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "removed": removed }),
        req_id.0,
    )))
}

/// DELETE /api/cart
pub(super) async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let cleared = lethashop_db::clear_cart(&state.pool, user.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "cleared": cleared }),
        req_id.0,
    )))
}
