mod admin;
mod payments;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lethashop-cli")]
#[command(about = "LethaShop maintenance commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Upsert the sample catalogue (categories and products)
    Seed,
    /// Create an admin account, or promote an existing one
    CreateAdmin {
        #[arg(long)]
        email: String,
        /// Required when the account does not exist yet
        #[arg(long, env = "LETHASHOP_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Time out pending M-Pesa requests older than the payment window
    ExpirePayments {
        /// Ask Daraja for the final result of each stale request first
        #[arg(long)]
        query: bool,
        /// List what would change without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = lethashop_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = lethashop_db::PoolConfig::from_app_config(&config);
    let pool = lethashop_db::connect_pool(&config.database_url, pool_config).await?;

    match cli.command {
        Commands::Migrate => {
            let applied = lethashop_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Seed => {
            lethashop_db::run_migrations(&pool).await?;
            let summary = lethashop_db::seed_catalog(&pool).await?;
            println!(
                "seeded {} categories and {} products",
                summary.categories, summary.products
            );
        }
        Commands::CreateAdmin {
            email,
            password,
            name,
        } => {
            admin::run_create_admin(&pool, &email, password, name.as_deref()).await?;
        }
        Commands::ExpirePayments { query, dry_run } => {
            payments::run_expire_payments(&pool, &config, query, dry_run).await?;
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests;
