use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use super::{DbResult, VectorPool};
use crate::config::{PoolKey, PostgresConfig, RetryConfig};

/// Shares one [`VectorPool`] per distinct backend.
///
/// Two configurations map to the same pool when host, port, database, user,
/// password, SSL mode and pool size all match.
pub struct PoolRegistry {
    pools: DashMap<PoolKey, Arc<VectorPool>>,
    retry: RetryConfig,
}

impl PoolRegistry {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            pools: DashMap::new(),
            retry,
        }
    }

    /// Return the live pool for `config`, creating it on first use.
    ///
    /// A pool that was closed is replaced.
    pub fn get_or_create(&self, config: &PostgresConfig) -> DbResult<Arc<VectorPool>> {
        match self.pools.entry(config.pool_key()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => Ok(entry.get().clone()),
            Entry::Occupied(mut entry) => {
                let pool = Arc::new(VectorPool::connect(config, self.retry.clone())?);
                entry.insert(pool.clone());
                Ok(pool)
            }
            Entry::Vacant(entry) => {
                let pool = Arc::new(VectorPool::connect(config, self.retry.clone())?);
                entry.insert(pool.clone());
                Ok(pool)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Close and forget every pool.
    pub async fn close_all(&self) {
        // Collect first; map guards must not be held across an await.
        let keys: Vec<PoolKey> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, pool)) = self.pools.remove(&key)
                && let Err(error) = pool.close().await
            {
                tracing::warn!(pool = ?key, error = %error, "Failed to close pool cleanly");
            }
        }
    }
}
