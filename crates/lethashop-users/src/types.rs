use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct RedirectUrlResponse {
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExchangeCodeRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionTokenResponse {
    pub session_token: String,
}

/// The user record held by the users service.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamUser {
    pub id: String,
    pub email: String,
    /// Profile data copied from the identity provider, when it shared any.
    #[serde(default, alias = "google_user_data")]
    pub provider_profile: Option<ProviderProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl UpstreamUser {
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.provider_profile
            .as_ref()?
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.provider_profile
            .as_ref()?
            .picture
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }
}
