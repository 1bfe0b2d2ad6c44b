//! `expire-payments`: the scheduler's payment-expiry job, run on demand.
//!
//! With `--query`, each stale request is first checked against Daraja's STK
//! query endpoint so payments whose callback never arrived are settled with
//! their real outcome instead of being timed out.

use chrono::{DateTime, TimeDelta, Utc};
use lethashop_mpesa::MpesaClient;

const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 300;

/// What an STK query result means for a stale request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryVerdict {
    Completed,
    Failed(i32),
    /// No final result yet; left for the expiry pass.
    Unresolved,
}

pub(crate) fn verdict(result_code: Option<i32>) -> QueryVerdict {
    match result_code {
        Some(0) => QueryVerdict::Completed,
        Some(code) => QueryVerdict::Failed(code),
        None => QueryVerdict::Unresolved,
    }
}

pub(crate) fn expiry_cutoff(now: DateTime<Utc>, timeout_secs: u64) -> DateTime<Utc> {
    let timeout = i64::try_from(timeout_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    now.checked_sub_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Expire stale pending payment requests, optionally reconciling them first.
///
/// # Errors
///
/// Returns an error if `--query` is used without M-Pesa credentials, the
/// client cannot be built, or a database call fails. Individual query
/// failures are logged and the request is left for expiry.
pub(crate) async fn run_expire_payments(
    pool: &sqlx::PgPool,
    config: &lethashop_core::AppConfig,
    query: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let timeout_secs = config
        .mpesa
        .as_ref()
        .map_or(DEFAULT_PAYMENT_TIMEOUT_SECS, |m| m.payment_timeout_secs);
    let cutoff = expiry_cutoff(Utc::now(), timeout_secs);

    let stale = lethashop_db::list_stale_pending_payments(pool, cutoff).await?;
    if stale.is_empty() {
        println!("no pending payment requests older than {timeout_secs}s");
        return Ok(());
    }

    if dry_run {
        for row in &stale {
            println!(
                "dry-run: would expire {} (order {}, created {})",
                row.checkout_request_id,
                row.order_id,
                row.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        return Ok(());
    }

    if query {
        let mpesa_config = config
            .mpesa
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("MPESA_* is not configured; cannot use --query"))?;
        let client = MpesaClient::new(mpesa_config)
            .map_err(|e| anyhow::anyhow!("failed to build M-Pesa client: {e}"))?;

        let mut settled = 0usize;
        for row in &stale {
            if reconcile(pool, &client, &row.checkout_request_id).await? {
                settled += 1;
            }
        }
        println!("settled {settled} of {} stale requests from STK query", stale.len());
    }

    let expired = lethashop_db::expire_stale_payments(pool, cutoff).await?;
    println!("expired {} payment requests", expired.len());
    Ok(())
}

/// Returns `true` when the request was completed or failed from the query.
async fn reconcile(
    pool: &sqlx::PgPool,
    client: &MpesaClient,
    checkout_request_id: &str,
) -> anyhow::Result<bool> {
    let response = match client.stk_query(checkout_request_id).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(checkout_request_id, error = %e, "stk query failed; leaving for expiry");
            return Ok(false);
        }
    };

    let outcome = |code: i32| lethashop_db::CallbackOutcome {
        result_code: code,
        result_desc: response
            .result_desc
            .clone()
            .unwrap_or_else(|| response.response_description.clone()),
        mpesa_receipt_number: None,
        raw_callback: None,
    };

    let applied = match verdict(response.result_code()) {
        QueryVerdict::Completed => {
            lethashop_db::complete_payment(pool, checkout_request_id, &outcome(0))
                .await?
                .map(|done| {
                    if !done.settled_order {
                        tracing::warn!(
                            checkout_request_id,
                            order_id = done.payment.order_id,
                            "order was already paid by another request; refund this payment"
                        );
                    }
                    done.payment
                })
        }
        QueryVerdict::Failed(code) => {
            lethashop_db::fail_payment(pool, checkout_request_id, &outcome(code)).await?
        }
        QueryVerdict::Unresolved => return Ok(false),
    };

    if let Some(row) = &applied {
        tracing::info!(
            checkout_request_id,
            order_id = row.order_id,
            status = %row.status,
            "settled payment request from stk query"
        );
    }
    Ok(applied.is_some())
}
