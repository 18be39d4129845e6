//! Identity resolution over cross-camera links.
//!
//! Identities are never stored as rows: after any link change the full set
//! of non-rejected links is walked with union-find and each connected
//! component of size >= 2 materializes its minimum track id onto every
//! member. The pass is idempotent and serialized behind a mutex so two
//! concurrent matchers cannot write inconsistent identity ids.

use std::collections::HashMap;

use revid_models::{AnchorClassification, SourceTrackType, TrackId};
use revid_store::Store;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::MatchResult;

/// Union-find with path compression and union by rank.
#[derive(Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl UnionFind {
    /// Create a forest of `n` singletons.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Root of `i`'s component, compressing the path on the way up.
    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the components of `a` and `b`.
    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// All components as index lists.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        let mut out: Vec<Vec<usize>> = by_root.into_values().collect();
        out.sort_by_key(|c| c.first().copied().unwrap_or(0));
        out
    }
}

/// Summary of one resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentitySummary {
    pub identities_count: usize,
    pub tracks_linked: usize,
}

/// Summary of a classification propagation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationSummary {
    pub propagated: usize,
    pub conflicts: usize,
}

/// Serializes and executes identity recomputes.
pub struct IdentityResolver {
    store: Store,
    lock: Mutex<()>,
}

impl IdentityResolver {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Recompute identities for one track family from its non-rejected
    /// links. Singleton tracks end with no identity.
    pub async fn resolve(&self, source: SourceTrackType) -> MatchResult<IdentitySummary> {
        let _guard = self.lock.lock().await;

        let links = self.store.list_effective_links(source).await?;

        // Reset first: tracks whose links were all rejected must drop back
        // to singleton
        match source {
            SourceTrackType::CameraObject => self.store.reset_track_identities().await?,
            SourceTrackType::VideoTrack => self.store.reset_video_track_identities().await?,
        }

        if links.is_empty() {
            return Ok(IdentitySummary {
                identities_count: 0,
                tracks_linked: 0,
            });
        }

        let mut track_ids: Vec<TrackId> = links
            .iter()
            .flat_map(|l| [l.track_a_id, l.track_b_id])
            .collect();
        track_ids.sort_unstable();
        track_ids.dedup();
        let index: HashMap<TrackId, usize> =
            track_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut uf = UnionFind::new(track_ids.len());
        for link in &links {
            uf.union(index[&link.track_a_id], index[&link.track_b_id]);
        }

        let mut identities_count = 0;
        let mut tracks_linked = 0;
        for component in uf.components() {
            if component.len() < 2 {
                continue;
            }
            let member_ids: Vec<TrackId> = component.iter().map(|&i| track_ids[i]).collect();
            let identity = *member_ids.iter().min().expect("non-empty component");

            let updated = match source {
                SourceTrackType::CameraObject => {
                    self.store.set_track_identities(&member_ids, identity).await?
                }
                SourceTrackType::VideoTrack => {
                    self.store.set_video_track_identities(&member_ids, identity).await?
                }
            };
            identities_count += 1;
            tracks_linked += updated;
        }

        info!(
            source = ?source,
            identities = identities_count,
            tracks_linked,
            "Identity assignment complete"
        );
        Ok(IdentitySummary {
            identities_count,
            tracks_linked,
        })
    }

    /// Propagate a majority-vote vehicle subtype across every camera-object
    /// identity, weighted by each track's member count. Human labels that
    /// disagree with the majority are flagged, never overwritten.
    pub async fn propagate_classifications(&self, scenario: &str) -> MatchResult<PropagationSummary> {
        let _guard = self.lock.lock().await;

        // Gather identity groups
        let cameras = self.store.list_cameras().await?;
        let mut groups: HashMap<TrackId, Vec<revid_models::CameraObjectTrack>> = HashMap::new();
        for camera in &cameras {
            for track in self.store.list_tracks(&camera.camera_id, scenario).await? {
                if let Some(identity) = track.cross_camera_identity_id {
                    groups.entry(identity).or_default().push(track);
                }
            }
        }

        let mut propagated = 0;
        let mut conflicts = 0;

        for (identity, tracks) in groups {
            // Member-count-weighted vote, ties broken by summed confidence
            let mut votes: HashMap<String, (u64, f64)> = HashMap::new();
            for track in &tracks {
                let Some(subtype) = track.vehicle_subtype() else {
                    continue;
                };
                let confidence: f64 = self
                    .store
                    .list_track_members(track.id)
                    .await?
                    .iter()
                    .map(|p| p.confidence as f64)
                    .sum();
                let entry = votes.entry(subtype.to_string()).or_insert((0, 0.0));
                entry.0 += track.member_count as u64;
                entry.1 += confidence;
            }

            let Some((majority, _)) = votes
                .iter()
                .max_by(|a, b| {
                    (a.1 .0, a.1 .1)
                        .partial_cmp(&(b.1 .0, b.1 .1))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(subtype, w)| (subtype.clone(), *w))
            else {
                continue;
            };
            let has_conflict = votes.len() > 1;
            if has_conflict {
                conflicts += 1;
            }

            for track in &tracks {
                match track.vehicle_subtype() {
                    Some(current) if current == majority => {}
                    Some(_) => {
                        // Disagreeing label: flag, keep the human decision
                        self.store.set_track_cross_camera_conflict(track.id, true).await?;
                        debug!(
                            identity,
                            track_id = track.id,
                            "Subtype disagrees with identity majority"
                        );
                    }
                    None => {
                        self.store
                            .set_track_classification(
                                track.id,
                                AnchorClassification {
                                    vehicle_subtype: Some(majority.clone()),
                                    actual_class: track.anchor_classification.actual_class.clone(),
                                    classified_by: Some("cross_camera_propagation".to_string()),
                                },
                                has_conflict,
                            )
                            .await?;
                        self.store
                            .propagate_subtype_to_members(
                                track.id,
                                scenario,
                                &majority,
                                "cross_camera_propagation",
                            )
                            .await?;
                        propagated += 1;
                    }
                }
            }
        }

        Ok(PropagationSummary {
            propagated,
            conflicts,
        })
    }
}
