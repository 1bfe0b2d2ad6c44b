//! Database operations for the `categories` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, parent_id, sort_order, created_at, updated_at";

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable category fields, used for both create and full update.
#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i32,
}

/// Returns all categories ordered by `sort_order`, then name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order, name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category(pool: &PgPool, id: i64) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (duplicate slug, unknown parent).
pub async fn create_category(pool: &PgPool, input: &CategoryInput) -> Result<CategoryRow, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "INSERT INTO categories (name, slug, description, parent_id, sort_order) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(input.parent_id)
    .bind(input.sort_order)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Replaces every writable field of a category. Returns `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_category(
    pool: &PgPool,
    id: i64,
    input: &CategoryInput,
) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "UPDATE categories \
         SET name = $2, slug = $3, description = $4, parent_id = $5, sort_order = $6, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(id)
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(input.parent_id)
    .bind(input.sort_order)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Deletes a category. Products and child categories keep existing with a
/// `NULL` reference. Returns `false` if nothing was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_category(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
