use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::SessionStore,
    cache::PageCache,
    config::Config,
    database::Database,
    error::AppResult,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub page_cache: PageCache,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let database = Database::new(&config.database.url).await?;
        database.init().await?;
        Ok(Self::with_database(Arc::new(database), config))
    }

    /// Wire up state around an already-initialized database (tests use
    /// this with an in-memory pool).
    pub fn with_database(db: Arc<Database>, config: Config) -> Self {
        let page_cache = PageCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.page_ttl_secs),
        );
        AppState {
            db,
            sessions: SessionStore::new(),
            page_cache,
            config,
        }
    }
}
