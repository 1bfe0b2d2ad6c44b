mod api;
mod auth;
mod middleware;
mod scheduler;

use std::sync::Arc;

use lethashop_mpesa::MpesaClient;
use lethashop_users::UsersServiceClient;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    auth::TokenService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(lethashop_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = lethashop_db::PoolConfig::from_app_config(&config);
    let pool = lethashop_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = lethashop_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let mpesa = match config.mpesa.as_ref() {
        Some(mpesa_config) => {
            tracing::info!(
                environment = ?mpesa_config.environment,
                shortcode = %mpesa_config.shortcode,
                "M-Pesa payments enabled"
            );
            Some(Arc::new(MpesaClient::new(mpesa_config)?))
        }
        None => {
            tracing::warn!("MPESA_* not configured; STK Push is disabled");
            None
        }
    };
    let users_service = config
        .users_service
        .as_ref()
        .map(UsersServiceClient::new)
        .transpose()?
        .map(Arc::new);
    if users_service.is_none() {
        tracing::info!("USERS_SERVICE_* not configured; OAuth sign-in is disabled");
    }

    let _scheduler = scheduler::build_scheduler(pool.clone(), Arc::clone(&config)).await?;

    let state = AppState {
        pool,
        tokens: TokenService::new(&config.jwt_secret, config.jwt_ttl_hours),
        config: Arc::clone(&config),
        mpesa,
        users_service,
    };
    let app = build_app(state, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "lethashop server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
