//! Back-office endpoints. Every route here sits behind `require_user` and
//! `require_admin`.

mod categories;
mod orders;
mod products;
mod users;

pub(super) use categories::{create_category, delete_category, list_categories, update_category};
pub(super) use orders::{list_orders, update_order_status};
pub(super) use products::{create_product, delete_product, list_products, update_product};
pub(super) use users::{list_users, update_user_status};

use super::{map_db_error, ApiError};

/// Checks that an optional category reference points at an existing row.
async fn ensure_category_exists(
    pool: &sqlx::PgPool,
    request_id: &str,
    category_id: Option<i64>,
) -> Result<(), ApiError> {
    let Some(id) = category_id else {
        return Ok(());
    };
    lethashop_db::get_category(pool, id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?
        .map(|_| ())
        .ok_or_else(|| {
            ApiError::new(
                request_id,
                "validation_error",
                format!("category {id} does not exist"),
            )
        })
}

/// Uses `slug` when given, otherwise derives one from `name`.
fn resolve_slug(request_id: &str, slug: Option<&str>, name: &str) -> Result<String, ApiError> {
    let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(explicit) => lethashop_core::slug_from_name(explicit),
        None => lethashop_core::slug_from_name(name),
    };
    if slug.is_empty() {
        return Err(ApiError::new(
            request_id,
            "validation_error",
            "slug must contain at least one letter or digit",
        ));
    }
    Ok(slug)
}
