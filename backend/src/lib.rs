use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod listings;
pub mod models;
pub mod ratings;
pub mod rules;
pub mod schema;
pub mod store;
pub mod transactions;
pub mod users;

use crate::error::{MarketError, MarketResult};
use crate::store::MarketStore;

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn MarketStore>,
    pub revoked: Arc<auth::RevokedTokens>,
}

impl AppState {
    pub fn new(config: config::AppConfig, store: Arc<dyn MarketStore>) -> Self {
        Self {
            config,
            store,
            revoked: Arc::new(auth::RevokedTokens::new()),
        }
    }

    /// Runs a blocking store call on tokio's blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> MarketResult<T>
    where
        F: FnOnce(&dyn MarketStore) -> MarketResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| MarketError::Internal(format!("store task failed: {}", e)))?
    }
}
