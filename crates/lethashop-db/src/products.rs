//! Database operations for the `products` table.
//!
//! Every read joins `categories` so rows carry `category_name`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const PRODUCT_SELECT: &str =
    "SELECT p.id, p.name, p.slug, p.description, p.price, p.compare_at_price, p.sku, \
            p.inventory_quantity, p.image_url, p.gallery_images, p.materials, \
            p.care_instructions, p.category_id, c.name AS category_name, \
            p.is_published, p.is_featured, p.created_at, p.updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from `products` joined with its category name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    pub inventory_quantity: i32,
    pub image_url: Option<String>,
    pub gallery_images: serde_json::Value,
    pub materials: Option<String>,
    pub care_instructions: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub is_published: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable product fields, used for both create and full update.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    pub inventory_quantity: i32,
    pub image_url: Option<String>,
    pub gallery_images: serde_json::Value,
    pub materials: Option<String>,
    pub care_instructions: Option<String>,
    pub category_id: Option<i64>,
    pub is_published: bool,
    pub is_featured: bool,
}

/// Filters for the public product listing. Both filters combine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductFilters<'a> {
    pub category_slug: Option<&'a str>,
    pub featured_only: bool,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns published products matching the filters, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_published_products(
    pool: &PgPool,
    filters: ProductFilters<'_>,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} \
         FROM products p \
         LEFT JOIN categories c ON c.id = p.category_id \
         WHERE p.is_published = true \
           AND ($1::text IS NULL OR c.slug = $1) \
           AND ($2 = false OR p.is_featured = true) \
         ORDER BY p.created_at DESC, p.id DESC"
    ))
    .bind(filters.category_slug)
    .bind(filters.featured_only)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every product, published or not, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_all_products(pool: &PgPool) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} \
         FROM products p \
         LEFT JOIN categories c ON c.id = p.category_id \
         ORDER BY p.created_at DESC, p.id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_published_product_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} \
         FROM products p \
         LEFT JOIN categories c ON c.id = p.category_id \
         WHERE p.slug = $1 AND p.is_published = true"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_published_product(pool: &PgPool, id: i64) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} \
         FROM products p \
         LEFT JOIN categories c ON c.id = p.category_id \
         WHERE p.id = $1 AND p.is_published = true"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches a product regardless of its published flag.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} \
         FROM products p \
         LEFT JOIN categories c ON c.id = p.category_id \
         WHERE p.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (duplicate slug, unknown category).
pub async fn create_product(pool: &PgPool, input: &ProductInput) -> Result<ProductRow, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "WITH p AS ( \
             INSERT INTO products ( \
                 name, slug, description, price, compare_at_price, sku, inventory_quantity, \
                 image_url, gallery_images, materials, care_instructions, category_id, \
                 is_published, is_featured \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING * \
         ) \
         {PRODUCT_SELECT} \
         FROM p \
         LEFT JOIN categories c ON c.id = p.category_id"
    ))
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(input.price)
    .bind(input.compare_at_price)
    .bind(&input.sku)
    .bind(input.inventory_quantity)
    .bind(&input.image_url)
    .bind(&input.gallery_images)
    .bind(&input.materials)
    .bind(&input.care_instructions)
    .bind(input.category_id)
    .bind(input.is_published)
    .bind(input.is_featured)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Replaces every writable field of a product. Returns `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_product(
    pool: &PgPool,
    id: i64,
    input: &ProductInput,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "WITH p AS ( \
             UPDATE products SET \
                 name = $2, slug = $3, description = $4, price = $5, compare_at_price = $6, \
                 sku = $7, inventory_quantity = $8, image_url = $9, gallery_images = $10, \
                 materials = $11, care_instructions = $12, category_id = $13, \
                 is_published = $14, is_featured = $15, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING * \
         ) \
         {PRODUCT_SELECT} \
         FROM p \
         LEFT JOIN categories c ON c.id = p.category_id"
    ))
    .bind(id)
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(input.price)
    .bind(input.compare_at_price)
    .bind(&input.sku)
    .bind(input.inventory_quantity)
    .bind(&input.image_url)
    .bind(&input.gallery_images)
    .bind(&input.materials)
    .bind(&input.care_instructions)
    .bind(input.category_id)
    .bind(input.is_published)
    .bind(input.is_featured)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Deletes a product. Cart lines go with it; order items keep their snapshot
/// with a `NULL` product reference. Returns `false` if nothing was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_product(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
