//! # Connection Context Store
//!
//! Short-lived mapping from a generated client identity to the caller and
//! lead metadata captured at token issuance. Every `put` schedules an
//! automatic expiry after the retention window; there is no capacity bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::ConnectionContext;

#[derive(Debug)]
struct StoredContext {
    context: ConnectionContext,
    /// Incremented on every put; only the timer of the latest put may evict.
    generation: u64,
}

/// In-memory context store with time-based eviction.
#[derive(Debug, Clone)]
pub struct ConnectionContextStore {
    entries: Arc<RwLock<HashMap<String, StoredContext>>>,
    generations: Arc<AtomicU64>,
    retention: Duration,
}

impl ConnectionContextStore {
    /// Create a store whose entries live for `retention` after their latest `put`.
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Insert or overwrite the context for `identity` and schedule its expiry.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn put(&self, identity: String, context: ConnectionContext) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;

        self.entries.write().await.insert(
            identity.clone(),
            StoredContext {
                context,
                generation,
            },
        );

        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(store.retention).await;
            store.expire_generation(&identity, generation).await;
        });
    }

    /// Look up the live context for `identity`.
    pub async fn get(&self, identity: &str) -> Option<ConnectionContext> {
        self.entries
            .read()
            .await
            .get(identity)
            .map(|stored| stored.context.clone())
    }

    /// Remove the context for `identity`. Returns whether an entry was removed.
    pub async fn expire(&self, identity: &str) -> bool {
        self.entries.write().await.remove(identity).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn expire_generation(&self, identity: &str, generation: u64) {
        let mut entries = self.entries.write().await;
        let is_current = entries
            .get(identity)
            .is_some_and(|stored| stored.generation == generation);

        if is_current {
            entries.remove(identity);
            debug!(identity = %identity, "Connection context expired");
        }
    }
}
