//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! payment-expiry job.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Used when M-Pesa is not configured; matches the client polling window.
const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 300;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<lethashop_core::AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_payment_expiry_job(&scheduler, pool, payment_timeout(&config)).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

fn payment_timeout(config: &lethashop_core::AppConfig) -> TimeDelta {
    let secs = config
        .mpesa
        .as_ref()
        .map_or(DEFAULT_PAYMENT_TIMEOUT_SECS, |m| m.payment_timeout_secs);
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Pending requests created before this instant are considered abandoned.
fn expiry_cutoff(now: DateTime<Utc>, timeout: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Register the payment-expiry job.
///
/// Runs at the top of every minute (`0 * * * * *`). Pending STK Push
/// requests older than the payment timeout move to `timeout` and their
/// orders to `failed`.
async fn register_payment_expiry_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    timeout: TimeDelta,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            run_payment_expiry(&pool, timeout).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn run_payment_expiry(pool: &PgPool, timeout: TimeDelta) {
    let cutoff = expiry_cutoff(Utc::now(), timeout);
    match lethashop_db::expire_stale_payments(pool, cutoff).await {
        Ok(expired) if expired.is_empty() => {
            tracing::debug!("scheduler: no stale payment requests");
        }
        Ok(expired) => {
            for row in &expired {
                tracing::info!(
                    order_id = row.order_id,
                    checkout_request_id = %row.checkout_request_id,
                    "scheduler: payment request timed out"
                );
            }
            tracing::info!(count = expired.len(), "scheduler: expired stale payments");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to expire stale payments");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_timeout_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let cutoff = expiry_cutoff(now, TimeDelta::seconds(300));
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 3, 9, 11, 55, 0).unwrap());
    }

    #[test]
    fn huge_timeout_saturates_instead_of_panicking() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            expiry_cutoff(now, TimeDelta::MAX),
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn expiry_job_times_out_old_pending_requests(pool: PgPool) {
        lethashop_db::seed_catalog(&pool).await.expect("seed");
        let user = lethashop_db::create_user(
            &pool,
            lethashop_db::NewUser {
                email: "late@example.com",
                password_hash: None,
                name: None,
                avatar_url: None,
                role: lethashop_core::UserRole::User,
            },
        )
        .await
        .expect("user");
        let product = lethashop_db::get_published_product_by_slug(&pool, "desk-pad")
            .await
            .expect("query")
            .expect("product");
        lethashop_db::add_to_cart(&pool, user.id, product.id, 1, None, None)
            .await
            .expect("cart");
        let (order, _) = lethashop_db::create_order_from_cart(
            &pool,
            &lethashop_db::NewOrder {
                user_id: user.id,
                order_number: "LS260309TEST".to_owned(),
                shipping: lethashop_db::AddressInput::default(),
                billing: None,
                customer: lethashop_db::CustomerInput::default(),
                notes: None,
            },
            &lethashop_core::ShippingPolicy::default(),
        )
        .await
        .expect("order");
        lethashop_db::record_payment_request(
            &pool,
            &lethashop_db::NewPaymentRequest {
                order_id: order.id,
                user_id: user.id,
                phone_number: "254712345678".to_owned(),
                amount: 80,
                merchant_request_id: "m-1".to_owned(),
                checkout_request_id: "ws_CO_STALE".to_owned(),
            },
        )
        .await
        .expect("payment");
        sqlx::query(
            "UPDATE payment_requests SET created_at = NOW() - INTERVAL '10 minutes' \
             WHERE checkout_request_id = 'ws_CO_STALE'",
        )
        .execute(&pool)
        .await
        .expect("age request");

        run_payment_expiry(&pool, TimeDelta::seconds(300)).await;

        let payment = lethashop_db::get_payment_by_checkout_id(&pool, "ws_CO_STALE")
            .await
            .expect("query")
            .expect("payment row");
        assert_eq!(payment.status, "timeout");
        let order = lethashop_db::get_order(&pool, order.id)
            .await
            .expect("query")
            .expect("order row");
        assert_eq!(order.status, "failed");
    }
}
