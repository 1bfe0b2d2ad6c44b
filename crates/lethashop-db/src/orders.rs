//! Database operations for `orders` and `order_items`.

use chrono::{DateTime, Utc};
use lethashop_core::{OrderStatus, OrderTotals, PricedLine, ShippingPolicy};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const ORDER_COLUMNS: &str = "id, user_id, order_number, status, subtotal_amount, shipping_amount, \
     total_amount, shipping_address_line1, shipping_address_line2, shipping_city, \
     shipping_state, shipping_postal_code, shipping_country, billing_address_line1, \
     billing_address_line2, billing_city, billing_state, billing_postal_code, billing_country, \
     customer_first_name, customer_last_name, customer_email, customer_phone, notes, \
     created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, price, created_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `orders` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub subtotal_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub shipping_address_line1: Option<String>,
    pub shipping_address_line2: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_country: Option<String>,
    pub billing_address_line1: Option<String>,
    pub billing_address_line2: Option<String>,
    pub billing_city: Option<String>,
    pub billing_state: Option<String>,
    pub billing_postal_code: Option<String>,
    pub billing_country: Option<String>,
    pub customer_first_name: Option<String>,
    pub customer_last_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from `order_items`. Name and unit price are snapshots taken at checkout.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    /// `None` once the product has been deleted.
    pub product_id: Option<i64>,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AddressInput {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub order_number: String,
    pub shipping: AddressInput,
    /// Falls back to the shipping address when absent.
    pub billing: Option<AddressInput>,
    pub customer: CustomerInput,
    pub notes: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckoutLine {
    product_id: i64,
    product_name: String,
    quantity: i32,
    price: Decimal,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Turns the user's cart into an order with item snapshots.
///
/// Totals are computed from current product prices, never from the client.
/// Unpublished products are left out. The order row and its items are
/// written in one transaction; the cart itself is left untouched until the
/// payment completes.
///
/// # Errors
///
/// Returns [`DbError::EmptyCart`] if no purchasable lines remain, or
/// [`DbError::Sqlx`] if any statement fails (a colliding order number
/// surfaces as a unique violation).
pub async fn create_order_from_cart(
    pool: &PgPool,
    order: &NewOrder,
    shipping_policy: &ShippingPolicy,
) -> Result<(OrderRow, Vec<OrderItemRow>), DbError> {
    let mut tx = pool.begin().await?;

    let lines = sqlx::query_as::<_, CheckoutLine>(
        "SELECT ci.product_id, p.name AS product_name, ci.quantity, p.price \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         WHERE ci.user_id = $1 AND p.is_published = true \
         ORDER BY ci.created_at, ci.id \
         FOR UPDATE OF ci",
    )
    .bind(order.user_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(DbError::EmptyCart);
    }

    let priced: Vec<PricedLine> = lines
        .iter()
        .map(|line| PricedLine {
            unit_price: line.price,
            quantity: line.quantity,
        })
        .collect();
    let totals = OrderTotals::compute(&priced, shipping_policy);
    let billing = order.billing.as_ref().unwrap_or(&order.shipping);

    let order_row = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO orders ( \
             user_id, order_number, status, subtotal_amount, shipping_amount, total_amount, \
             shipping_address_line1, shipping_address_line2, shipping_city, shipping_state, \
             shipping_postal_code, shipping_country, billing_address_line1, \
             billing_address_line2, billing_city, billing_state, billing_postal_code, \
             billing_country, customer_first_name, customer_last_name, customer_email, \
             customer_phone, notes \
         ) VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                   $15, $16, $17, $18, $19, $20, $21, $22) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.user_id)
    .bind(&order.order_number)
    .bind(totals.subtotal)
    .bind(totals.shipping)
    .bind(totals.total)
    .bind(&order.shipping.line1)
    .bind(&order.shipping.line2)
    .bind(&order.shipping.city)
    .bind(&order.shipping.state)
    .bind(&order.shipping.postal_code)
    .bind(&order.shipping.country)
    .bind(&billing.line1)
    .bind(&billing.line2)
    .bind(&billing.city)
    .bind(&billing.state)
    .bind(&billing.postal_code)
    .bind(&billing.country)
    .bind(&order.customer.first_name)
    .bind(&order.customer.last_name)
    .bind(&order.customer.email)
    .bind(&order.customer.phone)
    .bind(&order.notes)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = sqlx::query_as::<_, OrderItemRow>(&format!(
            "INSERT INTO order_items (order_id, product_id, product_name, quantity, price) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ORDER_ITEM_COLUMNS}"
        ))
        .bind(order_row.id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(line.quantity)
        .bind(line.price)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    tx.commit().await?;
    Ok((order_row, items))
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_order(pool: &PgPool, id: i64) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItemRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
        "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns one user's orders, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_orders_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<OrderRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every order, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_all_orders(pool: &PgPool) -> Result<Vec<OrderRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_order_status(
    pool: &PgPool,
    id: i64,
    status: OrderStatus,
) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "UPDATE orders SET status = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
