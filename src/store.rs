//! StateStore trait - the key-value primitive beneath a reactive store.
//!
//! A backend only has to hold a [`State`], apply merge or replace writes,
//! and publish a [`StateChange`](crate::watch::StateChange) per write.
//! Computed properties, watchers and tracing live above it in
//! [`ReactiveStore`](crate::ReactiveStore), which funnels every mutation
//! through its pipeline before calling [`StateStore::set_state`].

use serde_json::Value;

use crate::state::State;
use crate::watch::ChangeStream;

/// The core state storage trait.
///
/// All backends implement this trait; the reactive layer depends on it
/// through `Arc<dyn StateStore>`, not on a specific implementation.
/// Writes are synchronous and must be applied atomically: a reader never
/// observes half of a `set_state` call.
pub trait StateStore: Send + Sync {
    /// Snapshot of the whole state.
    fn get_state(&self) -> State;

    /// Apply `state`.
    ///
    /// With `replace` the stored state becomes exactly `state`; otherwise
    /// each key of `state` overwrites the stored key of the same name.
    fn set_state(&self, state: State, replace: bool);

    /// Stream of every write applied from now on.
    fn subscribe(&self) -> ChangeStream;

    /// End every outstanding subscription.
    fn destroy(&self);

    /// Get a single property.
    fn get(&self, key: &str) -> Option<Value> {
        self.get_state().get(key).cloned()
    }

    /// Check if a property exists.
    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Overlay `delta` onto `target` key-wise.
pub fn merge_into(target: &mut State, delta: State) {
    for (key, value) in delta {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::into_state;
    use serde_json::json;

    #[test]
    fn test_merge_into_overwrites_and_keeps() {
        let mut target = into_state(json!({"a": 1, "b": 2})).unwrap();
        merge_into(&mut target, into_state(json!({"b": 3, "c": 4})).unwrap());
        assert_eq!(Value::Object(target), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_into_keeps_insertion_order() {
        let mut target = into_state(json!({"z": 1})).unwrap();
        merge_into(&mut target, into_state(json!({"a": 2})).unwrap());
        let keys: Vec<&String> = target.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
