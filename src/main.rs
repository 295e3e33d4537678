use std::sync::Arc;

mod app;
mod auth;
mod config;
mod db;
mod state;

use crate::{auth::repo::PgUserStore, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accounts=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);
    let addr = config.bind_addr().await?;

    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;
    tracing::info!("database ready");

    let state = AppState::from_parts(Arc::new(PgUserStore::new(pool.clone())), config);
    app::serve(app::build_app(state), addr).await?;

    pool.close().await;
    tracing::info!("database pool closed");
    Ok(())
}
