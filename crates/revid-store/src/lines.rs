//! Crossing line repository.

use revid_models::{CrossingLine, CrossingLineId};

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

impl Store {
    /// Create a crossing line. The forward vector must be a unit vector.
    pub async fn create_crossing_line(&self, mut line: CrossingLine) -> StoreResult<CrossingLine> {
        let mag = line.forward_magnitude();
        if (mag - 1.0).abs() > 1e-3 {
            return Err(StoreError::bad_input(format!(
                "forward vector magnitude {mag:.4} is not 1"
            )));
        }
        let mut state = self.state.write().await;
        line.id = alloc(&mut state.next_line_id);
        line.paired_line_id = None;
        state.crossing_lines.insert(line.id, line.clone());
        Ok(line)
    }

    /// Fetch a crossing line by id.
    pub async fn get_crossing_line(&self, id: CrossingLineId) -> StoreResult<CrossingLine> {
        let state = self.state.read().await;
        state
            .crossing_lines
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("crossing_line", id))
    }

    /// Pair two lines on different cameras. The references are symmetric.
    pub async fn pair_crossing_lines(
        &self,
        line_id: CrossingLineId,
        other_id: CrossingLineId,
        lane_mapping_reversed: bool,
    ) -> StoreResult<()> {
        if line_id == other_id {
            return Err(StoreError::bad_input("cannot pair a line with itself"));
        }
        let mut state = self.state.write().await;

        let cam_a = state
            .crossing_lines
            .get(&line_id)
            .ok_or_else(|| StoreError::not_found("crossing_line", line_id))?
            .camera_id
            .clone();
        let cam_b = state
            .crossing_lines
            .get(&other_id)
            .ok_or_else(|| StoreError::not_found("crossing_line", other_id))?
            .camera_id
            .clone();
        if cam_a == cam_b {
            return Err(StoreError::bad_input(
                "paired crossing lines must be on different cameras",
            ));
        }

        let a = state.crossing_lines.get_mut(&line_id).expect("checked above");
        a.paired_line_id = Some(other_id);
        a.lane_mapping_reversed = lane_mapping_reversed;
        let b = state.crossing_lines.get_mut(&other_id).expect("checked above");
        b.paired_line_id = Some(line_id);
        b.lane_mapping_reversed = lane_mapping_reversed;
        Ok(())
    }

    /// Remove a line's pairing, symmetrically.
    pub async fn unpair_crossing_line(&self, line_id: CrossingLineId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let other = state
            .crossing_lines
            .get_mut(&line_id)
            .ok_or_else(|| StoreError::not_found("crossing_line", line_id))?
            .paired_line_id
            .take();
        if let Some(other_id) = other {
            if let Some(b) = state.crossing_lines.get_mut(&other_id) {
                b.paired_line_id = None;
            }
        }
        Ok(())
    }

    /// All paired line pairs, each once (lower id first).
    pub async fn list_paired_crossing_lines(&self) -> StoreResult<Vec<(CrossingLine, CrossingLine)>> {
        let state = self.state.read().await;
        let mut pairs = Vec::new();
        for line in state.crossing_lines.values() {
            if let Some(other_id) = line.paired_line_id {
                if line.id < other_id {
                    if let Some(other) = state.crossing_lines.get(&other_id) {
                        pairs.push((line.clone(), other.clone()));
                    }
                }
            }
        }
        pairs.sort_by_key(|(a, _)| a.id);
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(camera_id: &str) -> CrossingLine {
        CrossingLine {
            id: 0,
            camera_id: camera_id.into(),
            line_name: "gate".into(),
            x1: 0.0,
            y1: 0.0,
            x2: 100.0,
            y2: 0.0,
            forward_dx: 0.0,
            forward_dy: 1.0,
            paired_line_id: None,
            lane_mapping_reversed: false,
        }
    }

    #[tokio::test]
    async fn test_pairing_is_symmetric() {
        let store = Store::new();
        let a = store.create_crossing_line(line("cam-a")).await.unwrap();
        let b = store.create_crossing_line(line("cam-b")).await.unwrap();
        store.pair_crossing_lines(a.id, b.id, true).await.unwrap();

        let a = store.get_crossing_line(a.id).await.unwrap();
        let b = store.get_crossing_line(b.id).await.unwrap();
        assert_eq!(a.paired_line_id, Some(b.id));
        assert_eq!(b.paired_line_id, Some(a.id));
        assert!(a.lane_mapping_reversed && b.lane_mapping_reversed);

        let pairs = store.list_paired_crossing_lines().await.unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[tokio::test]
    async fn test_same_camera_pairing_rejected() {
        let store = Store::new();
        let a = store.create_crossing_line(line("cam-a")).await.unwrap();
        let b = store.create_crossing_line(line("cam-a")).await.unwrap();
        assert!(matches!(
            store.pair_crossing_lines(a.id, b.id, false).await,
            Err(StoreError::BadInput(_))
        ));
    }

    #[tokio::test]
    async fn test_non_unit_forward_vector_rejected() {
        let store = Store::new();
        let mut bad = line("cam-a");
        bad.forward_dy = 2.0;
        assert!(matches!(
            store.create_crossing_line(bad).await,
            Err(StoreError::BadInput(_))
        ));
    }
}
