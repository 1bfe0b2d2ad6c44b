//! Database operations for `payment_requests`, the M-Pesa STK Push ledger.
//!
//! A request starts `pending` and moves exactly once: to `completed` or
//! `failed` when Safaricom calls back, or to `timeout` when it sits pending
//! past the payment window. A late success callback may still complete a
//! `timeout` row, since the customer has already been charged by then.
//!
//! An order has at most one `pending` request at a time, and only the first
//! request to complete settles it. Every order-level side effect runs with
//! the order row locked.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::DbError;

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, phone_number, amount, merchant_request_id, \
     checkout_request_id, status, result_code, result_desc, mpesa_receipt_number, raw_callback, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `payment_requests` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRequestRow {
    pub id: i64,
    pub order_id: i64,
    pub user_id: Uuid,
    pub phone_number: String,
    /// Whole KES, as sent to Daraja.
    pub amount: i64,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub status: String,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub raw_callback: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub order_id: i64,
    pub user_id: Uuid,
    pub phone_number: String,
    pub amount: i64,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
}

/// A request moved to `completed`. `settled_order` is false when another
/// request for the same order had already completed, so the order, stock and
/// cart were left alone and the duplicate charge needs a manual refund.
#[derive(Debug, Clone)]
pub struct CompletedPayment {
    pub payment: PaymentRequestRow,
    pub settled_order: bool,
}

/// What Safaricom reported for a checkout request.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub result_code: i32,
    pub result_desc: String,
    pub mpesa_receipt_number: Option<String>,
    pub raw_callback: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Stores a freshly accepted STK Push and puts its order back to `pending`.
///
/// # Errors
///
/// Returns [`DbError::OrderNotPayable`] if the order is missing or no longer
/// `pending`/`failed`, [`DbError::PaymentInProgress`] if it already has a
/// `pending` request, or [`DbError::Sqlx`] if a statement fails.
pub async fn record_payment_request(
    pool: &PgPool,
    request: &NewPaymentRequest,
) -> Result<PaymentRequestRow, DbError> {
    let mut tx = pool.begin().await?;

    // Also takes the order row lock for the rest of the transaction.
    let moved = sqlx::query(
        "UPDATE orders SET status = 'pending', updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'failed')",
    )
    .bind(request.order_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if moved == 0 {
        return Err(DbError::OrderNotPayable(request.order_id));
    }

    if pending_request_exists(&mut *tx, request.order_id).await? {
        return Err(DbError::PaymentInProgress(request.order_id));
    }

    let row = sqlx::query_as::<_, PaymentRequestRow>(&format!(
        "INSERT INTO payment_requests ( \
             order_id, user_id, phone_number, amount, merchant_request_id, checkout_request_id \
         ) VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(request.order_id)
    .bind(request.user_id)
    .bind(&request.phone_number)
    .bind(request.amount)
    .bind(&request.merchant_request_id)
    .bind(&request.checkout_request_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Marks a payment as completed and settles its order.
///
/// In one transaction: the request becomes `completed`, and unless another
/// request for the order already completed, the order becomes `paid`, stock
/// is decremented for every ordered item (never below zero) and the ordered
/// products are removed from the buyer's cart.
///
/// Returns `None` when no `pending` or `timeout` request matches, which
/// covers unknown ids and repeated callbacks.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn complete_payment(
    pool: &PgPool,
    checkout_request_id: &str,
    outcome: &CallbackOutcome,
) -> Result<Option<CompletedPayment>, DbError> {
    let mut tx = pool.begin().await?;

    let Some(row) = transition(
        &mut tx,
        checkout_request_id,
        "completed",
        &["pending", "timeout"],
        outcome,
    )
    .await?
    else {
        return Ok(None);
    };

    sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
        .bind(row.order_id)
        .execute(&mut *tx)
        .await?;

    let already_settled: bool = sqlx::query_scalar(
        "SELECT EXISTS ( \
             SELECT 1 FROM payment_requests \
             WHERE order_id = $1 AND id <> $2 AND status = 'completed' \
         )",
    )
    .bind(row.order_id)
    .bind(row.id)
    .fetch_one(&mut *tx)
    .await?;

    if !already_settled {
        settle_order(&mut tx, &row).await?;
    }

    tx.commit().await?;
    Ok(Some(CompletedPayment {
        payment: row,
        settled_order: !already_settled,
    }))
}

async fn settle_order(
    tx: &mut Transaction<'_, Postgres>,
    row: &PaymentRequestRow,
) -> Result<(), DbError> {
    sqlx::query("UPDATE orders SET status = 'paid', updated_at = NOW() WHERE id = $1")
        .bind(row.order_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        "UPDATE products p \
         SET inventory_quantity = GREATEST(p.inventory_quantity - oi.quantity, 0), \
             updated_at = NOW() \
         FROM order_items oi \
         WHERE oi.order_id = $1 AND oi.product_id = p.id",
    )
    .bind(row.order_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "DELETE FROM cart_items \
         WHERE user_id = $1 \
           AND product_id IN (SELECT product_id FROM order_items WHERE order_id = $2)",
    )
    .bind(row.user_id)
    .bind(row.order_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Marks a pending payment as failed and fails its order, unless another
/// request for the same order already completed or is still pending.
///
/// Returns `None` when no `pending` request matches.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn fail_payment(
    pool: &PgPool,
    checkout_request_id: &str,
    outcome: &CallbackOutcome,
) -> Result<Option<PaymentRequestRow>, DbError> {
    let mut tx = pool.begin().await?;

    let Some(row) = transition(&mut tx, checkout_request_id, "failed", &["pending"], outcome).await?
    else {
        return Ok(None);
    };

    fail_orders_without_completed_payment(&mut tx, &[row.order_id]).await?;

    tx.commit().await?;
    Ok(Some(row))
}

/// Moves every `pending` request created before `cutoff` to `timeout` and
/// fails their orders, except orders that completed or have a newer pending
/// request. Returns the expired rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn expire_stale_payments(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<PaymentRequestRow>, DbError> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query_as::<_, PaymentRequestRow>(&format!(
        "UPDATE payment_requests \
         SET status = 'timeout', result_desc = COALESCE(result_desc, 'Payment window expired'), \
             updated_at = NOW() \
         WHERE status = 'pending' AND created_at < $1 \
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    let order_ids: Vec<i64> = rows.iter().map(|row| row.order_id).collect();
    if !order_ids.is_empty() {
        fail_orders_without_completed_payment(&mut tx, &order_ids).await?;
    }

    tx.commit().await?;
    Ok(rows)
}

async fn transition(
    tx: &mut Transaction<'_, Postgres>,
    checkout_request_id: &str,
    to: &str,
    from: &[&str],
    outcome: &CallbackOutcome,
) -> Result<Option<PaymentRequestRow>, DbError> {
    let row = sqlx::query_as::<_, PaymentRequestRow>(&format!(
        "UPDATE payment_requests \
         SET status = $2, result_code = $3, result_desc = $4, \
             mpesa_receipt_number = COALESCE($5, mpesa_receipt_number), \
             raw_callback = COALESCE($6, raw_callback), updated_at = NOW() \
         WHERE checkout_request_id = $1 AND status = ANY($7) \
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(checkout_request_id)
    .bind(to)
    .bind(outcome.result_code)
    .bind(&outcome.result_desc)
    .bind(&outcome.mpesa_receipt_number)
    .bind(&outcome.raw_callback)
    .bind(from)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

async fn fail_orders_without_completed_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_ids: &[i64],
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE orders o SET status = 'failed', updated_at = NOW() \
         WHERE o.id = ANY($1) \
           AND o.status = 'pending' \
           AND NOT EXISTS ( \
               SELECT 1 FROM payment_requests pr \
               WHERE pr.order_id = o.id AND pr.status IN ('completed', 'pending') \
           )",
    )
    .bind(order_ids)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn pending_request_exists<'e, E>(executor: E, order_id: i64) -> Result<bool, DbError>
where
    E: sqlx::PgExecutor<'e>,
{
    let exists = sqlx::query_scalar(
        "SELECT EXISTS ( \
             SELECT 1 FROM payment_requests WHERE order_id = $1 AND status = 'pending' \
         )",
    )
    .bind(order_id)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// True while an STK Push for the order is still awaiting its callback.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn has_pending_payment(pool: &PgPool, order_id: i64) -> Result<bool, DbError> {
    pending_request_exists(pool, order_id).await
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_payment_by_checkout_id(
    pool: &PgPool,
    checkout_request_id: &str,
) -> Result<Option<PaymentRequestRow>, DbError> {
    let row = sqlx::query_as::<_, PaymentRequestRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment_requests WHERE checkout_request_id = $1"
    ))
    .bind(checkout_request_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the most recent payment request for an order, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_payment_for_order(
    pool: &PgPool,
    order_id: i64,
) -> Result<Option<PaymentRequestRow>, DbError> {
    let row = sqlx::query_as::<_, PaymentRequestRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment_requests \
         WHERE order_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Pending requests created before `cutoff`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stale_pending_payments(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<PaymentRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, PaymentRequestRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment_requests \
         WHERE status = 'pending' AND created_at < $1 \
         ORDER BY created_at"
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
