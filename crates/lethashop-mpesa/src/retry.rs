//! Retry with exponential back-off and jitter for idempotent Daraja calls.
//!
//! Only the OAuth token request goes through [`retry_with_backoff`]. An STK
//! Push is never retried: a second push would prompt the customer twice.

use std::future::Future;
use std::time::Duration;

use crate::error::MpesaError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// Network timeouts, connection failures and 5xx responses are retried.
/// Rejections, malformed bodies and 4xx responses are returned immediately.
pub(crate) fn is_retriable(err: &MpesaError) -> bool {
    match err {
        MpesaError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        MpesaError::UnexpectedStatus { status, .. } => *status >= 500,
        MpesaError::Rejected { .. }
        | MpesaError::Deserialize { .. }
        | MpesaError::InvalidConfig(_) => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// The delay before retry `n` is `backoff_base_ms × 2ⁿ⁻¹` with ±25 % jitter,
/// capped at 30 s. Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, MpesaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MpesaError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "daraja transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn rejection_is_not_retriable() {
        assert!(!is_retriable(&MpesaError::Rejected {
            code: "400.002.02".to_owned(),
            message: "Bad Request - Invalid Amount".to_owned(),
        }));
    }

    #[test]
    fn server_error_status_is_retriable() {
        assert!(is_retriable(&MpesaError::UnexpectedStatus {
            status: 503,
            body: String::new(),
        }));
        assert!(!is_retriable(&MpesaError::UnexpectedStatus {
            status: 401,
            body: String::new(),
        }));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, MpesaError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err::<u32, _>(MpesaError::UnexpectedStatus {
                        status: 502,
                        body: "bad gateway".to_owned(),
                    })
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(MpesaError::UnexpectedStatus {
                    status: 500,
                    body: String::new(),
                })
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(MpesaError::UnexpectedStatus { status: 500, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 attempt + 2 retries");
    }

    #[tokio::test]
    async fn does_not_retry_rejection() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(MpesaError::Rejected {
                    code: "404.001.03".to_owned(),
                    message: "Invalid Access Token".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(MpesaError::Rejected { .. })));
    }
}
