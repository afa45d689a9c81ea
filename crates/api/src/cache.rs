//! Read-through cache fronting `GET /bills/{id}`.
//!
//! Entries live for a fixed TTL under a bounded capacity with
//! least-recently-used-style eviction. Mutations never invalidate entries;
//! stale reads inside the TTL are an accepted trade-off.

use std::time::Duration;

use billfold_core::BillId;

use crate::dto::GetBillResponse;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: u64,
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            time_to_live: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Clone)]
pub struct BillCache {
    inner: moka::future::Cache<String, GetBillResponse>,
}

impl BillCache {
    pub fn new(config: CacheConfig) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(config.time_to_live)
            .build();
        Self { inner }
    }

    pub async fn get(&self, id: BillId) -> Option<GetBillResponse> {
        let hit = self.inner.get(&id.to_string()).await;
        if hit.is_some() {
            tracing::debug!(bill_id = %id, "bill cache hit");
        }
        hit
    }

    pub async fn put(&self, id: BillId, response: GetBillResponse) {
        self.inner.insert(id.to_string(), response).await;
    }
}
