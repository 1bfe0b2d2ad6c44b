//! Database operations for the `cart_items` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const CART_SELECT: &str =
    "SELECT ci.id, ci.user_id, ci.product_id, ci.quantity, ci.size, ci.color, \
            ci.created_at, ci.updated_at, \
            p.name AS product_name, p.slug AS product_slug, p.price, p.image_url";

/// A cart line joined with the product fields the cart page renders.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: i64,
    pub user_id: Uuid,
    pub product_id: i64,
    pub quantity: i32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub product_name: String,
    pub product_slug: String,
    pub price: Decimal,
    pub image_url: Option<String>,
}

/// Returns a user's cart lines in the order they were added. Lines for
/// products that have since been unpublished are left out, matching what
/// checkout will accept.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cart_items(pool: &PgPool, user_id: Uuid) -> Result<Vec<CartItemRow>, DbError> {
    let rows = sqlx::query_as::<_, CartItemRow>(&format!(
        "{CART_SELECT} \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         WHERE ci.user_id = $1 AND p.is_published = true \
         ORDER BY ci.created_at, ci.id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Adds a product to the cart. Adding a product that is already in the cart
/// increments its quantity instead of creating a second line.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn add_to_cart(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
    quantity: i32,
    size: Option<&str>,
    color: Option<&str>,
) -> Result<CartItemRow, DbError> {
    let row = sqlx::query_as::<_, CartItemRow>(&format!(
        "WITH ci AS ( \
             INSERT INTO cart_items (user_id, product_id, quantity, size, color) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET \
                 quantity = cart_items.quantity + EXCLUDED.quantity, \
                 size = COALESCE(EXCLUDED.size, cart_items.size), \
                 color = COALESCE(EXCLUDED.color, cart_items.color), \
                 updated_at = NOW() \
             RETURNING * \
         ) \
         {CART_SELECT} \
         FROM ci \
         JOIN products p ON p.id = ci.product_id"
    ))
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .bind(size)
    .bind(color)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Sets the quantity of an existing cart line. Returns `None` if the product
/// is not in the user's cart.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_cart_quantity(
    pool: &PgPool,
    user_id: Uuid,
    product_id: i64,
    quantity: i32,
) -> Result<Option<CartItemRow>, DbError> {
    let row = sqlx::query_as::<_, CartItemRow>(&format!(
        "WITH ci AS ( \
             UPDATE cart_items SET quantity = $3, updated_at = NOW() \
             WHERE user_id = $1 AND product_id = $2 \
             RETURNING * \
         ) \
         {CART_SELECT} \
         FROM ci \
         JOIN products p ON p.id = ci.product_id"
    ))
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns `false` if the product was not in the cart.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn remove_cart_item(pool: &PgPool, user_id: Uuid, product_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Empties a user's cart and returns how many lines were removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_cart(pool: &PgPool, user_id: Uuid) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
