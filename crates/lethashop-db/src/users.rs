//! Database operations for the `users` table.

use chrono::{DateTime, Utc};
use lethashop_core::UserRole;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const USER_COLUMNS: &str =
    "id, email, name, avatar_url, role, is_active, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `users` table, without the password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin.as_str()
    }
}

/// A user together with the stored password hash, used only for sign-in.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentialsRow {
    #[sqlx(flatten)]
    pub user: UserRow,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub email: &'a str,
    /// `None` for accounts that only sign in through OAuth.
    pub password_hash: Option<&'a str>,
    pub name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub role: UserRole,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts a new user and returns the created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails; a duplicate email surfaces
/// as a unique violation (see [`DbError::is_unique_violation`]).
pub async fn create_user(pool: &PgPool, user: NewUser<'_>) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, password_hash, name, avatar_url, role, is_active) \
         VALUES ($1, $2, $3, $4, $5, true) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.name)
    .bind(user.avatar_url)
    .bind(user.role.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns an active user with their password hash, or `None`.
///
/// Inactive accounts are filtered out here so sign-in never sees them.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_credentials_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserCredentialsRow>, DbError> {
    let row = sqlx::query_as::<_, UserCredentialsRow>(&format!(
        "SELECT {USER_COLUMNS}, password_hash FROM users \
         WHERE email = $1 AND is_active = true"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Creates or refreshes a user signing in through the OAuth users service.
///
/// `role` only applies on insert; an existing account keeps its role. Name
/// and avatar are refreshed when the provider supplies them.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_oauth_user(
    pool: &PgPool,
    email: &str,
    name: Option<&str>,
    avatar_url: Option<&str>,
    role: UserRole,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, name, avatar_url, role, is_active) \
         VALUES ($1, $2, $3, $4, true) \
         ON CONFLICT (email) DO UPDATE SET \
             name = COALESCE(EXCLUDED.name, users.name), \
             avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url), \
             updated_at = NOW() \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .bind(name)
    .bind(avatar_url)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Updates the self-editable profile fields. `None` leaves a field unchanged.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_user_profile(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users \
         SET name = COALESCE($2, name), \
             avatar_url = COALESCE($3, avatar_url), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(avatar_url)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_user_active(
    pool: &PgPool,
    id: Uuid,
    is_active: bool,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET is_active = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns every user, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_users(pool: &PgPool) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Grants the admin role to the account with this email.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn promote_user_to_admin(pool: &PgPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET role = 'admin', updated_at = NOW() \
         WHERE email = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
