pub mod app_config;
pub mod catalog;
pub mod config;
pub mod orders;
pub mod phone;
pub mod users;

use thiserror::Error;

pub use app_config::{
    AppConfig, Environment, MpesaConfig, MpesaEnvironment, ShippingPolicy, UsersServiceConfig,
};
pub use catalog::slug_from_name;
pub use config::{load_app_config, load_app_config_from_env};
pub use orders::{
    generate_order_number, payable_amount, OrderStatus, OrderTotals, PaymentStatus, PricedLine,
};
pub use phone::normalize_msisdn;
pub use users::{
    hash_password, normalize_email, role_for_new_account, validate_password, verify_password,
    UserRole, MIN_PASSWORD_LEN,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid order status: {0}")]
    InvalidOrderStatus(String),
    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),
    #[error("invalid user role: {0}")]
    InvalidRole(String),
    #[error("invalid phone number '{0}': expected a Kenyan number such as 0712345678")]
    InvalidPhoneNumber(String),
    #[error("invalid payment amount: {0}")]
    InvalidAmount(String),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}
