use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Shortest password accepted for a local account.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        self == UserRole::Admin
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }
}

/// Role assigned to a freshly registered account.
///
/// Accounts on the configured staff domain start as admins; everyone else is
/// a regular user.
#[must_use]
pub fn role_for_new_account(email: &str, admin_email_domain: Option<&str>) -> UserRole {
    let Some(domain) = admin_email_domain else {
        return UserRole::User;
    };
    match email.rsplit_once('@') {
        Some((_, email_domain)) if email_domain.eq_ignore_ascii_case(domain) => UserRole::Admin,
        _ => UserRole::User,
    }
}

/// Trims and lowercases an email address, rejecting anything without a
/// local part and a dotted domain.
///
/// # Errors
///
/// Returns [`CoreError::InvalidEmail`] for malformed input.
pub fn normalize_email(raw: &str) -> Result<String, CoreError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(email)
    } else {
        Err(CoreError::InvalidEmail(raw.trim().to_string()))
    }
}

/// # Errors
///
/// Returns [`CoreError::PasswordTooShort`] below [`MIN_PASSWORD_LEN`] characters.
pub fn validate_password(password: &str) -> Result<(), CoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Hashes a password with Argon2id into a PHC string. CPU-bound; async
/// callers should run it on the blocking pool.
///
/// # Errors
///
/// Returns [`CoreError::PasswordHash`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::PasswordHash(e.to_string()))
}

/// Checks a password against a stored PHC string. Unparseable hashes never match.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}
