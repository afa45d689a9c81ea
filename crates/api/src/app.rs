//! Service wiring and the HTTP router.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, routing::get, Router};

use billfold_orchestrator::BillHost;
use billfold_store::{BillStore, MemoryBillStore};

use crate::cache::{BillCache, CacheConfig};
use crate::routes;

/// Everything the handlers need: the store for existence checks and closed
/// reads, the host for dispatching to live instances, and the read cache.
pub struct AppServices {
    store: Arc<dyn BillStore>,
    host: BillHost,
    cache: BillCache,
}

impl AppServices {
    pub fn new(store: Arc<dyn BillStore>, cache_config: CacheConfig) -> Self {
        let host = BillHost::new(Arc::clone(&store));
        Self {
            store,
            host,
            cache: BillCache::new(cache_config),
        }
    }

    /// In-memory wiring for dev and tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBillStore::new()), CacheConfig::default())
    }

    pub fn in_memory_with_cache(cache_config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBillStore::new()), cache_config)
    }

    pub fn store(&self) -> &dyn BillStore {
        self.store.as_ref()
    }

    pub fn host(&self) -> &BillHost {
        &self.host
    }

    pub fn cache(&self) -> &BillCache {
        &self.cache
    }
}

pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/bills", routes::bills::router())
        .layer(Extension(services))
}

async fn health() -> StatusCode {
    StatusCode::OK
}
