//! HTTP client for the users service.
//!
//! Every request carries the service API key in `x-api-key`. Calls that act
//! on a user session also send the upstream session token as a bearer token.

use std::time::Duration;

use lethashop_core::UsersServiceConfig;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::UsersServiceError;
use crate::types::{
    ExchangeCodeRequest, RedirectUrlResponse, SessionTokenResponse, UpstreamUser,
};

const API_KEY_HEADER: &str = "x-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct UsersServiceClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl std::fmt::Debug for UsersServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsersServiceClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl UsersServiceClient {
    /// Creates a client for the configured users service.
    ///
    /// # Errors
    ///
    /// Returns [`UsersServiceError::InvalidConfig`] if the API URL does not
    /// parse, or [`UsersServiceError::Http`] if the `reqwest::Client` cannot
    /// be built.
    pub fn new(config: &UsersServiceConfig) -> Result<Self, UsersServiceError> {
        Self::with_base_url(config, &config.api_url)
    }

    /// Creates a client against an explicit base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`UsersServiceClient::new`].
    pub fn with_base_url(
        config: &UsersServiceConfig,
        base_url: &str,
    ) -> Result<Self, UsersServiceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("lethashop/0.1 (users)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            UsersServiceError::InvalidConfig(format!("invalid API URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Returns the URL the browser should visit to sign in with `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`UsersServiceError::InvalidProvider`] for provider names
    /// that are not a plain path segment, and any transport or status error.
    pub async fn redirect_url(&self, provider: &str) -> Result<String, UsersServiceError> {
        if provider.is_empty()
            || !provider
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(UsersServiceError::InvalidProvider(provider.to_owned()));
        }

        let url = self.endpoint(&format!("oauth/{provider}/redirect_url"))?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let body: RedirectUrlResponse = read_json(response, "redirect_url").await?;
        Ok(body.redirect_url)
    }

    /// Trades an OAuth authorization code for an upstream session token.
    ///
    /// # Errors
    ///
    /// Returns [`UsersServiceError::Unauthorized`] if the code is rejected.
    pub async fn exchange_code(&self, code: &str) -> Result<String, UsersServiceError> {
        let url = self.endpoint("sessions")?;
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&ExchangeCodeRequest { code })
            .send()
            .await?;
        let body: SessionTokenResponse = read_json(response, "sessions").await?;
        tracing::debug!("exchanged oauth code for upstream session");
        Ok(body.session_token)
    }

    /// Resolves an upstream session token to the user it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`UsersServiceError::Unauthorized`] if the session is unknown
    /// or expired.
    pub async fn current_user(&self, session_token: &str) -> Result<UpstreamUser, UsersServiceError> {
        let url = self.endpoint("users/me")?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .bearer_auth(session_token)
            .send()
            .await?;
        read_json(response, "users/me").await
    }

    /// Revokes an upstream session. A session the service no longer knows
    /// counts as revoked.
    ///
    /// # Errors
    ///
    /// Returns transport errors and unexpected statuses.
    pub async fn delete_session(&self, session_token: &str) -> Result<(), UsersServiceError> {
        let url = self.endpoint("sessions")?;
        let response = self
            .client
            .delete(url)
            .header(API_KEY_HEADER, &self.api_key)
            .bearer_auth(session_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND
        {
            return Ok(());
        }
        let body = response.text().await?;
        Err(UsersServiceError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, UsersServiceError> {
        self.base_url.join(path).map_err(|e| {
            UsersServiceError::InvalidConfig(format!("invalid endpoint '{path}': {e}"))
        })
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, UsersServiceError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(UsersServiceError::Unauthorized);
    }

    let body = response.text().await?;
    if !status.is_success() {
        tracing::warn!(context, status = status.as_u16(), "users service request failed");
        return Err(UsersServiceError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| UsersServiceError::Deserialize {
        context: context.to_owned(),
        source: e,
    })
}
