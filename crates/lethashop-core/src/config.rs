use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{
    AppConfig, Environment, MpesaConfig, MpesaEnvironment, ShippingPolicy, UsersServiceConfig,
};
use crate::ConfigError;

const MIN_JWT_SECRET_LEN: usize = 32;

const MPESA_CREDENTIAL_VARS: [&str; 5] = [
    "MPESA_CONSUMER_KEY",
    "MPESA_CONSUMER_SECRET",
    "MPESA_SHORTCODE",
    "MPESA_PASSKEY",
    "MPESA_CALLBACK_URL",
];

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.into(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default =
        |var: &str, default: &str| -> String { optional(var).unwrap_or_else(|| default.to_string()) };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_decimal = |var: &str, default: &str| -> Result<Decimal, ConfigError> {
        let value = Decimal::from_str(&or_default(var, default))
            .map_err(|e| invalid(var, e.to_string()))?;
        if value.is_sign_negative() {
            return Err(invalid(var, "must not be negative"));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let jwt_secret = require("LETHASHOP_JWT_SECRET")?;
    if jwt_secret.len() < MIN_JWT_SECRET_LEN {
        return Err(invalid(
            "LETHASHOP_JWT_SECRET",
            format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
        ));
    }

    let env = parse_environment(&or_default("LETHASHOP_ENV", "development"));

    let bind_addr = or_default("LETHASHOP_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("LETHASHOP_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("LETHASHOP_LOG_LEVEL", "info");
    let jwt_ttl_hours = parse_u64("LETHASHOP_JWT_TTL_HOURS", "168")?;
    if jwt_ttl_hours == 0 {
        return Err(invalid("LETHASHOP_JWT_TTL_HOURS", "must be greater than 0"));
    }

    let cors_origins = parse_list(&or_default("LETHASHOP_CORS_ORIGINS", "http://localhost:5173"));
    let static_dir = optional("LETHASHOP_STATIC_DIR").map(PathBuf::from);
    let admin_email_domain = match lookup("LETHASHOP_ADMIN_EMAIL_DOMAIN") {
        // An explicitly empty value turns the rule off.
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().trim_start_matches('@').to_lowercase()),
        Err(_) => Some("lethashop.com".to_string()),
    };

    let shipping = ShippingPolicy {
        free_shipping_threshold: parse_decimal("LETHASHOP_FREE_SHIPPING_THRESHOLD", "150")?,
        flat_fee: parse_decimal("LETHASHOP_FLAT_SHIPPING_FEE", "15")?,
    };

    let db_max_connections = parse_u32("LETHASHOP_DB_MAX_CONNECTIONS", "20")?;
    let db_min_connections = parse_u32("LETHASHOP_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("LETHASHOP_DB_ACQUIRE_TIMEOUT_SECS", "2")?;

    let mpesa = {
        let present: Vec<&str> = MPESA_CREDENTIAL_VARS
            .iter()
            .copied()
            .filter(|var| optional(*var).is_some())
            .collect();
        if present.is_empty() {
            None
        } else if let Some(missing) = MPESA_CREDENTIAL_VARS
            .iter()
            .find(|var| !present.contains(*var))
        {
            return Err(ConfigError::MissingEnvVar((*missing).to_string()));
        } else {
            Some(MpesaConfig {
                consumer_key: require("MPESA_CONSUMER_KEY")?,
                consumer_secret: require("MPESA_CONSUMER_SECRET")?,
                shortcode: require("MPESA_SHORTCODE")?,
                passkey: require("MPESA_PASSKEY")?,
                callback_url: require("MPESA_CALLBACK_URL")?,
                environment: parse_mpesa_environment(&or_default("MPESA_ENVIRONMENT", "sandbox"))?,
                base_url: optional("MPESA_BASE_URL"),
                callback_token: optional("MPESA_CALLBACK_TOKEN"),
                request_timeout_secs: parse_u64("MPESA_REQUEST_TIMEOUT_SECS", "30")?,
                payment_timeout_secs: parse_u64("MPESA_PAYMENT_TIMEOUT_SECS", "300")?,
            })
        }
    };

    let users_service = match (
        optional("USERS_SERVICE_API_URL"),
        optional("USERS_SERVICE_API_KEY"),
    ) {
        (Some(api_url), Some(api_key)) => Some(UsersServiceConfig { api_url, api_key }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(ConfigError::MissingEnvVar(
                "USERS_SERVICE_API_KEY".to_string(),
            ))
        }
        (None, Some(_)) => {
            return Err(ConfigError::MissingEnvVar(
                "USERS_SERVICE_API_URL".to_string(),
            ))
        }
    };

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        jwt_secret,
        jwt_ttl_hours,
        cors_origins,
        static_dir,
        admin_email_domain,
        shipping,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        mpesa,
        users_service,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_mpesa_environment(s: &str) -> Result<MpesaEnvironment, ConfigError> {
    match s {
        "sandbox" => Ok(MpesaEnvironment::Sandbox),
        "production" => Ok(MpesaEnvironment::Production),
        other => Err(invalid(
            "MPESA_ENVIRONMENT",
            format!("expected 'sandbox' or 'production', got '{other}'"),
        )),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
