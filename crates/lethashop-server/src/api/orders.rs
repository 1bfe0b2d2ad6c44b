//! Checkout and order lookup for the signed-in customer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::{CurrentUser, RequestId};

use super::{map_db_error, non_empty, ApiError, ApiResponse, AppState};

/// Attempts before giving up on an order-number collision.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(super) struct AddressBody {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl From<AddressBody> for lethashop_db::AddressInput {
    fn from(body: AddressBody) -> Self {
        Self {
            line1: non_empty(body.line1),
            line2: non_empty(body.line2),
            city: non_empty(body.city),
            state: non_empty(body.state),
            postal_code: non_empty(body.postal_code),
            country: non_empty(body.country),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CustomerBody {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Client-sent items and totals are ignored; the order is priced from the cart.
#[derive(Debug, Deserialize)]
pub(super) struct CreateOrderRequest {
    #[serde(default)]
    pub shipping_address: AddressBody,
    pub billing_address: Option<AddressBody>,
    #[serde(default)]
    pub customer_info: CustomerBody,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct AddressView {
    line1: Option<String>,
    line2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct CustomerView {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct OrderItem {
    id: i64,
    user_id: uuid::Uuid,
    order_number: String,
    status: String,
    subtotal: Decimal,
    shipping: Decimal,
    total: Decimal,
    shipping_address: AddressView,
    billing_address: AddressView,
    customer: CustomerView,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<lethashop_db::OrderRow> for OrderItem {
    fn from(row: lethashop_db::OrderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            order_number: row.order_number,
            status: row.status,
            subtotal: row.subtotal_amount,
            shipping: row.shipping_amount,
            total: row.total_amount,
            shipping_address: AddressView {
                line1: row.shipping_address_line1,
                line2: row.shipping_address_line2,
                city: row.shipping_city,
                state: row.shipping_state,
                postal_code: row.shipping_postal_code,
                country: row.shipping_country,
            },
            billing_address: AddressView {
                line1: row.billing_address_line1,
                line2: row.billing_address_line2,
                city: row.billing_city,
                state: row.billing_state,
                postal_code: row.billing_postal_code,
                country: row.billing_country,
            },
            customer: CustomerView {
                first_name: row.customer_first_name,
                last_name: row.customer_last_name,
                email: row.customer_email,
                phone: row.customer_phone,
            },
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct OrderLineItem {
    id: i64,
    product_id: Option<i64>,
    product_name: String,
    quantity: i32,
    price: Decimal,
    line_total: Decimal,
}

impl From<lethashop_db::OrderItemRow> for OrderLineItem {
    fn from(row: lethashop_db::OrderItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            line_total: row.price * Decimal::from(row.quantity),
            product_name: row.product_name,
            quantity: row.quantity,
            price: row.price,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct OrderDetail {
    #[serde(flatten)]
    order: OrderItem,
    items: Vec<OrderLineItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderStatusItem {
    id: i64,
    order_number: String,
    status: String,
    payment_status: Option<String>,
    mpesa_receipt_number: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Loads an order the caller may see. Other users' orders are reported as
/// missing rather than forbidden.
pub(in crate::api) async fn load_visible_order(
    state: &AppState,
    request_id: &str,
    user: &lethashop_db::UserRow,
    order_id: i64,
) -> Result<lethashop_db::OrderRow, ApiError> {
    let order = lethashop_db::get_order(&state.pool, order_id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?
        .filter(|order| order.user_id == user.id || user.is_admin());

    order.ok_or_else(|| {
        ApiError::new(
            request_id,
            "not_found",
            format!("order {order_id} not found"),
        )
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/orders
pub(super) async fn create_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ApiError> {
    let rid = &req_id.0;
    let customer = body.customer_info;
    let mut new_order = lethashop_db::NewOrder {
        user_id: user.id,
        order_number: String::new(),
        shipping: body.shipping_address.into(),
        billing: body.billing_address.map(Into::into),
        customer: lethashop_db::CustomerInput {
            first_name: non_empty(customer.first_name),
            last_name: non_empty(customer.last_name),
            email: non_empty(customer.email).or_else(|| Some(user.email.clone())),
            phone: non_empty(customer.phone),
        },
        notes: non_empty(body.notes),
    };

    let mut attempt = 0;
    let (order, items) = loop {
        attempt += 1;
        new_order.order_number = lethashop_core::generate_order_number(Utc::now());
        match lethashop_db::create_order_from_cart(&state.pool, &new_order, &state.config.shipping)
            .await
        {
            Ok(created) => break created,
            Err(e) if e.is_unique_violation() && attempt < ORDER_NUMBER_ATTEMPTS => {
                tracing::warn!(order_number = %new_order.order_number, "order number collision, retrying");
            }
            Err(e) => return Err(map_db_error(rid.clone(), &e)),
        }
    };

    tracing::info!(
        order_id = order.id,
        order_number = %order.order_number,
        total = %order.total_amount,
        "order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            OrderDetail {
                order: order.into(),
                items: items.into_iter().map(OrderLineItem::from).collect(),
            },
            req_id.0,
        )),
    ))
}

/// GET /api/orders
pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<OrderItem>>>, ApiError> {
    let rows = lethashop_db::list_orders_for_user(&state.pool, user.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(OrderItem::from).collect(),
        req_id.0,
    )))
}

/// GET /api/orders/{id}
pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let rid = &req_id.0;
    let order = load_visible_order(&state, rid, &user, id).await?;
    let items = lethashop_db::list_order_items(&state.pool, order.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        OrderDetail {
            order: order.into(),
            items: items.into_iter().map(OrderLineItem::from).collect(),
        },
        req_id.0,
    )))
}

/// GET /api/orders/{id}/status
///
/// Polled by the checkout page while the customer confirms on their phone.
pub(super) async fn get_order_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<OrderStatusItem>>, ApiError> {
    let rid = &req_id.0;
    let order = load_visible_order(&state, rid, &user, id).await?;
    let payment = lethashop_db::latest_payment_for_order(&state.pool, order.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let (payment_status, mpesa_receipt_number) =
        payment.map_or((None, None), |p| (Some(p.status), p.mpesa_receipt_number));

    Ok(Json(ApiResponse::new(
        OrderStatusItem {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_status,
            mpesa_receipt_number,
        },
        req_id.0,
    )))
}
