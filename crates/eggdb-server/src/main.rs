mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    scheduler::{ScheduleSettings, ScrapeScheduler},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(eggdb_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = eggdb_db::PoolConfig::from_app_config(&config);
    let pool = eggdb_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = eggdb_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations up to date");

    let catalog = eggdb_core::load_catalog(&config.catalog_path)?;
    tracing::info!(
        chains = catalog.chains().len(),
        locations = catalog.len(),
        path = %config.catalog_path.display(),
        "store catalog loaded"
    );

    let orchestrator = Arc::new(eggdb_collector::build_orchestrator(
        &config,
        catalog,
        pool.clone(),
        false,
    )?);
    let state = AppState::new(pool, orchestrator);

    let mut scheduler = ScrapeScheduler::new(state.clone(), ScheduleSettings::from_config(&config));
    scheduler.start().await?;

    let auth = AuthState::from_env(matches!(config.env, eggdb_core::Environment::Development))?;
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "eggdb-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
