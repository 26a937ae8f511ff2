//! In-memory state store implementation.
//!
//! This implementation is NOT durable - data is lost on process exit.
//! It is the default backend of [`ReactiveStore`](crate::ReactiveStore).

use parking_lot::RwLock;
use std::sync::Arc;

use crate::state::State;
use crate::store::{merge_into, StateStore};
use crate::watch::{ChangeKind, ChangeSender, ChangeStream, StateChange};

/// In-memory implementation of StateStore.
///
/// Uses an insertion-ordered map behind a RwLock. Change events are sent
/// after the lock is released, so subscribers may read the store again.
pub struct MemoryStore {
    data: Arc<RwLock<State>>,
    sender: ChangeSender,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_state(State::new())
    }

    /// Create a store holding `state`.
    pub fn with_state(state: State) -> Self {
        Self {
            data: Arc::new(RwLock::new(state)),
            sender: ChangeSender::new(1024),
        }
    }

    /// Get the number of properties in the store.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get_state(&self) -> State {
        self.data.read().clone()
    }

    fn set_state(&self, state: State, replace: bool) {
        let change = {
            let mut data = self.data.write();
            let previous = data.clone();
            let kind = if replace {
                *data = state;
                ChangeKind::Replaced
            } else {
                merge_into(&mut data, state);
                ChangeKind::Merged
            };
            StateChange::new(kind, previous, data.clone())
        };
        self.sender.send(change);
    }

    fn subscribe(&self) -> ChangeStream {
        self.sender.subscribe()
    }

    fn destroy(&self) {
        self.sender.close();
    }
}
