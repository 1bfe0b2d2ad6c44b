//! HTTP client for the Daraja STK Push API.
//!
//! Wraps `reqwest` with Daraja's two-step auth: a client-credentials OAuth
//! token (cached until shortly before it expires) and a per-request
//! `Password` derived from the shortcode, passkey and timestamp.

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use lethashop_core::MpesaConfig;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::error::MpesaError;
use crate::retry::retry_with_backoff;
use crate::types::{
    AccessTokenResponse, ErrorResponse, StkPushRequest, StkPushResponse, StkQueryRequest,
    StkQueryResponse,
};

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
/// Refresh the cached token this long before Daraja says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_TTL_SECS: u64 = 3599;
const NAIROBI_UTC_OFFSET_HOURS: i64 = 3;
const ACCOUNT_REFERENCE_MAX_LEN: usize = 12;
const TRANSACTION_DESC_MAX_LEN: usize = 13;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// `YYYYMMDDHHmmss` in East Africa Time, as Daraja expects.
#[must_use]
pub fn daraja_timestamp(now: DateTime<Utc>) -> String {
    (now + TimeDelta::hours(NAIROBI_UTC_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// `base64(shortcode + passkey + timestamp)`.
#[must_use]
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Parameters of a single STK Push.
#[derive(Debug, Clone, Copy)]
pub struct StkPushParams<'a> {
    /// Normalised `2547XXXXXXXX` number.
    pub phone_number: &'a str,
    /// Whole KES.
    pub amount: i64,
    pub account_reference: &'a str,
    pub transaction_desc: &'a str,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client for Safaricom's Daraja API.
///
/// Use [`MpesaClient::new`] to target the configured environment or
/// [`MpesaClient::with_base_url`] to point at a mock server in tests.
pub struct MpesaClient {
    client: Client,
    base_url: Url,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    callback_url: String,
    token: Mutex<Option<CachedToken>>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl std::fmt::Debug for MpesaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaClient")
            .field("base_url", &self.base_url.as_str())
            .field("shortcode", &self.shortcode)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

impl MpesaClient {
    /// Creates a client for the environment named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MpesaError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`MpesaError::InvalidConfig`] if a URL in the config is invalid.
    pub fn new(config: &MpesaConfig) -> Result<Self, MpesaError> {
        Self::with_base_url(config, config.effective_base_url())
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`MpesaError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`MpesaError::InvalidConfig`] if `base_url` or the callback URL is invalid.
    pub fn with_base_url(config: &MpesaConfig, base_url: &str) -> Result<Self, MpesaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("lethashop/0.1 (mpesa)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            MpesaError::InvalidConfig(format!("invalid base URL '{base_url}': {e}"))
        })?;

        let callback_url =
            callback_url_with_token(&config.callback_url, config.callback_token.as_deref())?;

        Ok(Self {
            client,
            base_url,
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            shortcode: config.shortcode.clone(),
            passkey: config.passkey.clone(),
            callback_url,
            token: Mutex::new(None),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        })
    }

    /// Overrides the retry policy for the OAuth request.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Returns a valid access token, fetching a new one when the cached
    /// token is missing or close to expiry.
    ///
    /// # Errors
    ///
    /// Returns any [`MpesaError`] from the OAuth request once retries are exhausted.
    pub async fn access_token(&self) -> Result<String, MpesaError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.fetch_token()
        })
        .await?;

        let ttl = fresh
            .expires_in
            .trim()
            .parse::<u64>()
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let lifetime = Duration::from_secs(ttl).saturating_sub(TOKEN_EXPIRY_MARGIN);
        tracing::debug!(ttl_secs = ttl, "fetched daraja access token");

        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    /// Sends an STK Push prompting the customer's phone for their M-Pesa PIN.
    ///
    /// Never retried. A 401 drops the cached token so the next call fetches
    /// a fresh one.
    ///
    /// # Errors
    ///
    /// - [`MpesaError::Rejected`] if Daraja returns an error body or a
    ///   non-zero `ResponseCode`.
    /// - [`MpesaError::Http`] / [`MpesaError::UnexpectedStatus`] on transport failures.
    pub async fn stk_push(&self, params: StkPushParams<'_>) -> Result<StkPushResponse, MpesaError> {
        let token = self.access_token().await?;
        let timestamp = daraja_timestamp(Utc::now());
        let account_reference = truncate(params.account_reference, ACCOUNT_REFERENCE_MAX_LEN);
        let transaction_desc = truncate(params.transaction_desc, TRANSACTION_DESC_MAX_LEN);

        let body = StkPushRequest {
            business_short_code: &self.shortcode,
            password: stk_password(&self.shortcode, &self.passkey, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: params.amount,
            party_a: params.phone_number,
            party_b: &self.shortcode,
            phone_number: params.phone_number,
            callback_url: &self.callback_url,
            account_reference,
            transaction_desc,
        };

        let url = self.endpoint("mpesa/stkpush/v1/processrequest")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        self.drop_token_if_unauthorized(&response).await;
        let parsed: StkPushResponse = Self::read_json(response, "stkpush").await?;

        if parsed.response_code != "0" {
            tracing::warn!(
                response_code = %parsed.response_code,
                description = %parsed.response_description,
                "stk push not accepted"
            );
            return Err(MpesaError::Rejected {
                code: parsed.response_code,
                message: parsed.response_description,
            });
        }

        tracing::info!(
            checkout_request_id = %parsed.checkout_request_id,
            amount = params.amount,
            "stk push accepted"
        );
        Ok(parsed)
    }

    /// Asks Daraja for the current state of an STK Push.
    ///
    /// # Errors
    ///
    /// Same as [`MpesaClient::stk_push`]. A transaction still being processed
    /// comes back as [`MpesaError::Rejected`] with Daraja's error code.
    pub async fn stk_query(
        &self,
        checkout_request_id: &str,
    ) -> Result<StkQueryResponse, MpesaError> {
        let token = self.access_token().await?;
        let timestamp = daraja_timestamp(Utc::now());

        let body = StkQueryRequest {
            business_short_code: &self.shortcode,
            password: stk_password(&self.shortcode, &self.passkey, &timestamp),
            timestamp,
            checkout_request_id,
        };

        let url = self.endpoint("mpesa/stkpushquery/v1/query")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        self.drop_token_if_unauthorized(&response).await;
        Self::read_json(response, "stkpushquery").await
    }

    async fn fetch_token(&self) -> Result<AccessTokenResponse, MpesaError> {
        let mut url = self.endpoint("oauth/v1/generate")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "client_credentials");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?;
        Self::read_json(response, "oauth").await
    }

    async fn drop_token_if_unauthorized(&self, response: &Response) {
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            *self.token.lock().await = None;
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, MpesaError> {
        self.base_url
            .join(path)
            .map_err(|e| MpesaError::InvalidConfig(format!("invalid endpoint '{path}': {e}")))
    }

    /// Reads a response body, mapping Daraja error bodies and non-2xx
    /// statuses to typed errors.
    async fn read_json<T: DeserializeOwned>(
        response: Response,
        context: &str,
    ) -> Result<T, MpesaError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                tracing::warn!(
                    context,
                    status = status.as_u16(),
                    error_code = %err.error_code,
                    request_id = ?err.request_id,
                    "daraja returned an error"
                );
                return Err(MpesaError::Rejected {
                    code: err.error_code,
                    message: err.error_message,
                });
            }
            return Err(MpesaError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| MpesaError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

/// Appends `?token=` to the callback URL when a shared callback token is configured.
fn callback_url_with_token(callback_url: &str, token: Option<&str>) -> Result<String, MpesaError> {
    let Some(token) = token else {
        return Ok(callback_url.to_owned());
    };
    let mut url = Url::parse(callback_url).map_err(|e| {
        MpesaError::InvalidConfig(format!("invalid callback URL '{callback_url}': {e}"))
    })?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
