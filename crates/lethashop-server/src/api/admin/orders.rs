use std::str::FromStr;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use lethashop_core::OrderStatus;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::super::orders::OrderItem;
use super::super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateOrderStatusRequest {
    pub status: String,
}

/// GET /api/admin/orders
pub(in crate::api) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<OrderItem>>>, ApiError> {
    let rows = lethashop_db::list_all_orders(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(OrderItem::from).collect(),
        req_id.0,
    )))
}

/// PUT /api/admin/orders/{id}/status
pub(in crate::api) async fn update_order_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderItem>>, ApiError> {
    let rid = &req_id.0;
    let status = OrderStatus::from_str(body.status.trim()).map_err(|_| {
        let allowed: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();
        ApiError::new(
            rid,
            "validation_error",
            format!("status must be one of: {}", allowed.join(", ")),
        )
    })?;

    let row = lethashop_db::update_order_status(&state.pool, id, status)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("order {id} not found")))?;

    tracing::info!(order_id = id, status = %status, "order status updated");
    Ok(Json(ApiResponse::new(row.into(), req_id.0)))
}
