//! Topology repository. The core consumes this table read-only; edges are
//! written by the offline learning job.

use revid_models::TopologyEdge;

use crate::error::StoreResult;
use crate::store::Store;

impl Store {
    /// Insert or replace a directional edge.
    pub async fn upsert_topology_edge(&self, edge: TopologyEdge) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .topology
            .insert((edge.camera_a.clone(), edge.camera_b.clone()), edge);
        Ok(())
    }

    /// Fetch the directional edge A -> B, if learned.
    pub async fn get_topology_edge(
        &self,
        camera_a: &str,
        camera_b: &str,
    ) -> StoreResult<Option<TopologyEdge>> {
        let state = self.state.read().await;
        Ok(state
            .topology
            .get(&(camera_a.to_string(), camera_b.to_string()))
            .cloned())
    }

    /// Unique unordered camera pairs with any learned edge, each pair with
    /// the lexicographically smaller camera first.
    pub async fn list_topology_pairs(&self) -> StoreResult<Vec<(String, String)>> {
        let state = self.state.read().await;
        let mut pairs: Vec<(String, String)> = state
            .topology
            .keys()
            .map(|(a, b)| {
                if a <= b {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                }
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }
}
