use lethashop_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 2;

// Path relative to crates/lethashop-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("order {0} cannot be paid in its current status")]
    OrderNotPayable(i64),
    #[error("order {0} already has a payment awaiting confirmation")]
    PaymentInProgress(i64),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    /// True when the underlying error is a Postgres unique-constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.has_sqlstate(UNIQUE_VIOLATION)
    }

    /// True when an insert or update referenced a row that does not exist.
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        self.has_sqlstate(FOREIGN_KEY_VIOLATION)
    }

    fn has_sqlstate(&self, code: &str) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => db_err.code().as_deref() == Some(code),
            _ => false,
        }
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // _sqlx_migrations does not exist on a fresh database; count that as zero.
    let applied_before = applied_migration_count(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = applied_migration_count(pool).await;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

async fn applied_migration_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}


pub mod cart;
pub mod categories;
pub mod orders;
pub mod payments;
pub mod products;
pub mod seed;
pub mod users;

pub use cart::{
    add_to_cart, clear_cart, list_cart_items, remove_cart_item, set_cart_quantity, CartItemRow,
};
pub use categories::{
    create_category, delete_category, get_category, list_categories, update_category,
    CategoryInput, CategoryRow,
};
pub use orders::{
    create_order_from_cart, get_order, list_all_orders, list_order_items, list_orders_for_user,
    update_order_status, AddressInput, CustomerInput, NewOrder, OrderItemRow, OrderRow,
};
pub use payments::{
    complete_payment, expire_stale_payments, fail_payment, get_payment_by_checkout_id,
    has_pending_payment, latest_payment_for_order, list_stale_pending_payments,
    record_payment_request, CallbackOutcome, CompletedPayment, NewPaymentRequest,
    PaymentRequestRow,
};
pub use products::{
    create_product, delete_product, get_product, get_published_product, get_published_product_by_slug,
    list_all_products, list_published_products, update_product, ProductFilters, ProductInput,
    ProductRow,
};
pub use seed::{seed_catalog, SeedSummary};
pub use users::{
    create_user, get_user_by_email, get_user_by_id, get_user_credentials_by_email, list_users,
    promote_user_to_admin, set_user_active, update_user_profile, upsert_oauth_user, NewUser,
    UserCredentialsRow, UserRow,
};
