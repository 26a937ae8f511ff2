//! Watchers and their registry.
//!
//! A [`Watcher`] is bound to one property name. After each store write the
//! pipeline asks the [`WatcherRegistry`] which watched properties changed
//! value and invokes their callbacks with the new value, the old value, and
//! the store itself as context.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::reactive::ReactiveStore;
use crate::state::State;

/// Shared watcher callback: `(new, old, store)`.
///
/// `old` is `None` when the property did not exist before the write.
pub type WatchFn = Arc<
    dyn Fn(&Value, Option<&Value>, &ReactiveStore) -> std::result::Result<(), BoxError>
        + Send
        + Sync,
>;

/// Definition of a watcher.
#[derive(Clone)]
pub struct Watcher {
    callback: WatchFn,
}

impl Watcher {
    /// Watcher from a fallible callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value, Option<&Value>, &ReactiveStore) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Watcher that cannot fail.
    pub fn infallible<F>(callback: F) -> Self
    where
        F: Fn(&Value, Option<&Value>, &ReactiveStore) + Send + Sync + 'static,
    {
        Self::new(move |new, old, store| {
            callback(new, old, store);
            Ok(())
        })
    }

    pub(crate) fn callback(&self) -> WatchFn {
        Arc::clone(&self.callback)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

/// A watcher due to fire, with the values it observes.
pub struct Triggered {
    pub name: String,
    pub callback: WatchFn,
    pub old: Option<Value>,
    pub new: Value,
}

impl fmt::Debug for Triggered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Triggered")
            .field("name", &self.name)
            .field("old", &self.old)
            .field("new", &self.new)
            .finish_non_exhaustive()
    }
}

/// Watchers by property name, in registration order.
#[derive(Default)]
pub struct WatcherRegistry {
    entries: IndexMap<String, WatchFn>,
}

impl WatcherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `watcher` for `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, watcher: &Watcher) {
        self.entries.insert(name.into(), watcher.callback());
    }

    /// Remove the watcher for `name`. Returns whether one was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.entries.shift_remove(name).is_some()
    }

    /// Keep only the names `keep` accepts; returns the removed names.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|name, _| {
            let kept = keep(name);
            if !kept {
                removed.push(name.clone());
            }
            kept
        });
        removed
    }

    /// Watchers whose property is a key of `applied` and whose value there
    /// differs structurally from `previous`, in registration order.
    ///
    /// `applied` is the partial state a pass wrote, so its keys are exactly
    /// the keys the pass touched.
    pub fn changed_of(&self, previous: &State, applied: &State) -> Vec<Triggered> {
        self.entries
            .iter()
            .filter_map(|(name, callback)| {
                let new = applied.get(name)?;
                let old = previous.get(name);
                (old != Some(new)).then(|| Triggered {
                    name: name.clone(),
                    callback: Arc::clone(callback),
                    old: old.cloned(),
                    new: new.clone(),
                })
            })
            .collect()
    }

    /// Check if `name` is watched.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Watched names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of registered watchers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no watchers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::into_state;
    use serde_json::json;

    fn state(value: Value) -> State {
        into_state(value).unwrap()
    }

    fn noop() -> Watcher {
        Watcher::infallible(|_, _, _| {})
    }

    fn fired(triggered: &[Triggered]) -> Vec<(&str, Option<&Value>, &Value)> {
        triggered
            .iter()
            .map(|t| (t.name.as_str(), t.old.as_ref(), &t.new))
            .collect()
    }

    #[test]
    fn test_changed_values_fire() {
        let mut registry = WatcherRegistry::new();
        registry.register("total", &noop());

        let triggered = registry.changed_of(&state(json!({"total": 3})), &state(json!({"total": 9})));
        assert_eq!(fired(&triggered), vec![("total", Some(&json!(3)), &json!(9))]);
    }

    #[test]
    fn test_equal_values_do_not_fire() {
        let mut registry = WatcherRegistry::new();
        registry.register("items", &noop());

        let previous = state(json!({"items": [1, {"a": true}]}));
        let applied = state(json!({"items": [1, {"a": true}]}));
        assert!(registry.changed_of(&previous, &applied).is_empty());
    }

    #[test]
    fn test_untouched_properties_do_not_fire() {
        let mut registry = WatcherRegistry::new();
        registry.register("count", &noop());

        let triggered = registry.changed_of(&state(json!({"count": 1})), &state(json!({"other": 2})));
        assert!(triggered.is_empty());
    }

    #[test]
    fn test_new_property_fires_without_old_value() {
        let mut registry = WatcherRegistry::new();
        registry.register("flag", &noop());

        let triggered = registry.changed_of(&State::new(), &state(json!({"flag": null})));
        assert_eq!(fired(&triggered), vec![("flag", None, &Value::Null)]);
    }

    #[test]
    fn test_registration_order() {
        let mut registry = WatcherRegistry::new();
        registry.register("b", &noop());
        registry.register("a", &noop());

        let triggered = registry.changed_of(&State::new(), &state(json!({"a": 1, "b": 2})));
        let names: Vec<&str> = triggered.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_unregister_and_retain() {
        let mut registry = WatcherRegistry::new();
        registry.register("a", &noop());
        registry.register("b", &noop());
        registry.register("c", &noop());

        assert!(registry.unregister("b"));
        assert!(!registry.contains("b"));
        assert_eq!(registry.retain(|name| name != "a"), vec!["a"]);
        assert_eq!(registry.names(), vec!["c"]);
        assert_eq!(registry.len(), 1);
    }
}
