use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use socialite::auth::session;
use socialite::config::{Cli, Config};
use socialite::db;
use socialite::routes;
use socialite::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directories exist
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database; a failed schema bootstrap aborts start-up
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let purged = session::purge_expired(&*pool.get()?)?;
    if purged > 0 {
        tracing::info!("Purged {} expired sessions", purged);
    }

    let state = AppState {
        db: pool,
        config: config.clone(),
    };

    let app = routes::build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
