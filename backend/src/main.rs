use std::sync::Arc;

use marketplace_backend::config::AppConfig;
use marketplace_backend::store::PgStore;
use marketplace_backend::{db, handlers, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;
    config.validate()?;
    log::info!("Loaded config for {}:{}", config.host, config.port);

    let pool = db::establish_pool(&config.database_url, config.db_pool_size)?;
    let test_query = db::ping(&pool)?;
    log::info!("Database test query result: {}", test_query);

    let addr = (config.host.clone(), config.port);
    let state = AppState::new(config, Arc::new(PgStore::new(pool)));
    let app = handlers::routes(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Starting server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
