//! `create-admin`: bootstrap a back-office account without the email-domain rule.

use lethashop_core::UserRole;

/// Promotes `email` to admin, creating the account first if needed.
///
/// An existing account keeps its password; `password` is only used for new
/// accounts.
///
/// # Errors
///
/// Returns an error if the email is invalid, a new account has no usable
/// password, or a database call fails.
pub(crate) async fn run_create_admin(
    pool: &sqlx::PgPool,
    email: &str,
    password: Option<String>,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let email = lethashop_core::normalize_email(email)?;

    if let Some(existing) = lethashop_db::get_user_by_email(pool, &email).await? {
        if existing.is_admin() {
            println!("{email} is already an admin");
            return Ok(());
        }
        lethashop_db::promote_user_to_admin(pool, &email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {email} disappeared during promotion"))?;
        tracing::info!(user_id = %existing.id, "promoted existing user to admin");
        println!("promoted {email} to admin");
        return Ok(());
    }

    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow::anyhow!("--password is required to create a new account"))?;
    lethashop_core::validate_password(&password)?;
    let password_hash =
        tokio::task::spawn_blocking(move || lethashop_core::hash_password(&password)).await??;

    let user = lethashop_db::create_user(
        pool,
        lethashop_db::NewUser {
            email: &email,
            password_hash: Some(&password_hash),
            name,
            avatar_url: None,
            role: UserRole::Admin,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "created admin account");
    println!("created admin {email}");
    Ok(())
}
