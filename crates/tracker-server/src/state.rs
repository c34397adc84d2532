use crate::auth::TokenRegistry;
use std::sync::Arc;
use tracker_core::config::AppConfig;
use tracker_core::{Database, RecordStore, UserStore};

/// Shared application state for the server.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub records: RecordStore,
    pub users: UserStore,
    pub tokens: Arc<TokenRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Arc<Database>) -> Self {
        let tokens = TokenRegistry::new(config.auth.token_ttl_mins);
        Self {
            records: RecordStore::new(db.clone()),
            users: UserStore::new(db).with_cost(config.auth.password_cost),
            tokens: Arc::new(tokens),
            config,
        }
    }

    /// Open the configured database file and build state around it.
    pub fn open(config: AppConfig) -> anyhow::Result<Self> {
        let db = Database::open(&config.database_path())?;
        Ok(Self::new(config, Arc::new(db)))
    }
}
