use std::net::SocketAddr;
use std::path::PathBuf;

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which Daraja deployment the M-Pesa client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    #[must_use]
    pub fn base_url(self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

/// Credentials and tuning for the Safaricom STK Push integration.
#[derive(Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub environment: MpesaEnvironment,
    /// Overrides the environment's base URL (used against mock servers).
    pub base_url: Option<String>,
    /// When set, callbacks must carry `?token=<value>`.
    pub callback_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Pending payment requests older than this are expired by the scheduler.
    pub payment_timeout_secs: u64,
}

impl MpesaConfig {
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }
}

impl std::fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("consumer_key", &"[redacted]")
            .field("consumer_secret", &"[redacted]")
            .field("shortcode", &self.shortcode)
            .field("passkey", &"[redacted]")
            .field("callback_url", &self.callback_url)
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field(
                "callback_token",
                &self.callback_token.as_ref().map(|_| "[redacted]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("payment_timeout_secs", &self.payment_timeout_secs)
            .finish()
    }
}

/// External OAuth users service used for "sign in with Google".
#[derive(Clone)]
pub struct UsersServiceConfig {
    pub api_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for UsersServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsersServiceConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

/// Flat-rate shipping with a free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub free_shipping_threshold: Decimal,
    pub flat_fee: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(150, 0),
            flat_fee: Decimal::new(15, 0),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: u64,
    pub cors_origins: Vec<String>,
    pub static_dir: Option<PathBuf>,
    pub admin_email_domain: Option<String>,
    pub shipping: ShippingPolicy,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub mpesa: Option<MpesaConfig>,
    pub users_service: Option<UsersServiceConfig>,
}

impl AppConfig {
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.env == Environment::Development
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("jwt_secret", &"[redacted]")
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("cors_origins", &self.cors_origins)
            .field("static_dir", &self.static_dir)
            .field("admin_email_domain", &self.admin_email_domain)
            .field("shipping", &self.shipping)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("mpesa", &self.mpesa)
            .field("users_service", &self.users_service)
            .finish()
    }
}
