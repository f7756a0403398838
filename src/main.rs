use medconsult_api::{app, config, database::DatabaseManager, logging, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();
    logging::init();

    let config = config::config();
    tracing::info!("Starting MedConsult API in {:?} mode", config.environment);

    let state = AppState::from_config(config)?;

    if config.database.auto_migrate {
        // Server still starts when the database is down; /health reports it
        let pool = state.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = DatabaseManager::migrate(&pool).await {
                tracing::error!("Automatic migration failed: {}", e);
            }
        });
    }

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("MedConsult API listening on http://{}", bind_addr);

    let pool = state.pool.clone();
    axum::serve(listener, app::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    DatabaseManager::close(&pool).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
