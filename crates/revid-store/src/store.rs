//! The store handle.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::state::State;

/// Handle to the prediction store. Cheap to clone; all clones share state.
///
/// Readers take the lock briefly and copy rows out; no references into the
/// store escape the lock.
#[derive(Clone)]
pub struct Store {
    pub(crate) state: Arc<RwLock<State>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::new())),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
