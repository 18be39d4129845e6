//! TTL cache over the learned topology table.
//!
//! The table is read-dominated and small; each worker caches it briefly and
//! invalidates on write.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use revid_models::TopologyEdge;
use revid_store::Store;
use tokio::sync::Mutex;

use crate::error::MatchResult;

/// Read-through topology cache with a short TTL.
pub struct TopologyCache {
    store: Store,
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), CachedEdge>>,
}

struct CachedEdge {
    edge: Option<TopologyEdge>,
    fetched_at: Instant,
}

impl TopologyCache {
    /// Create a cache with the given TTL.
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Directional edge A -> B, `None` when no route is known.
    pub async fn get(&self, camera_a: &str, camera_b: &str) -> MatchResult<Option<TopologyEdge>> {
        let key = (camera_a.to_string(), camera_b.to_string());
        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries.get(&key) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.edge.clone());
                }
            }
        }

        let edge = self.store.get_topology_edge(camera_a, camera_b).await?;
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            CachedEdge {
                edge: edge.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(edge)
    }

    /// The edge for an unordered pair: A->B wins, B->A is the fallback.
    /// Also reports whether the pair is bidirectional (both edges learned).
    pub async fn get_pair(
        &self,
        camera_a: &str,
        camera_b: &str,
    ) -> MatchResult<Option<(TopologyEdge, bool)>> {
        let ab = self.get(camera_a, camera_b).await?;
        let ba = self.get(camera_b, camera_a).await?;
        let bidirectional = ab.is_some() && ba.is_some();
        Ok(ab.or(ba).map(|edge| (edge, bidirectional)))
    }

    /// Drop all cached entries. Called after topology writes.
    pub async fn invalidate(&self) {
        self.entries.lock().await.clear();
    }

    /// Unique unordered camera pairs with any learned edge.
    pub async fn pairs(&self) -> MatchResult<Vec<(String, String)>> {
        Ok(self.store.list_topology_pairs().await?)
    }
}
