use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use server::{AppState, routes};
use services::services::{
    config::AppConfig,
    realtime::{RealtimeService, TableInvalidation},
    routine_scheduler::RoutineSchedulerService,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

const DEFAULT_LOG_FILTER: &str = "info,server=debug,services=debug,db=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let _sentry = utils::sentry::init_once(config.sentry_dsn.as_deref(), &config.environment);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .with(utils::sentry::sentry_layer())
        .init();

    let db = DBService::new(&config.database_url)
        .await
        .context("failed to open database")?;
    let state = AppState::new(db.clone(), config.clone());
    state
        .storage()
        .ensure_root()
        .await
        .context("failed to create storage directory")?;

    if config.scheduler_enabled {
        RoutineSchedulerService::spawn(db.clone(), config.scheduler_interval, config.timezone)
            .await;
    } else {
        warn!("Routine scheduler disabled; periods roll over only when started manually");
    }
    RealtimeService::new(
        state.cache().clone(),
        state.hub().clone(),
        Arc::new(TableInvalidation::default()),
    )
    .spawn(&db)
    .await;

    let app = routes::router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
