//! Computed properties and their registry.
//!
//! A [`Computed`] is a function of a [`StateView`] whose result is stored in
//! the state under the property's name. The pipeline recomputes it whenever
//! a mutation touches one of its dependencies. Dependencies come from the
//! definition's source text (see [`crate::deps`]) plus any declared with
//! [`Computed::depends_on`].
//!
//! The [`computed!`](crate::computed!) macro captures the source text of a
//! closure so extraction works without repeating the key names:
//!
//! ```
//! use univrs_reactive::{computed, Computed};
//!
//! let double: Computed = computed!(|state| state["count"].as_i64().unwrap_or_default() * 2);
//! assert!(double.dependencies().contains("count"));
//! ```

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::deps::extract_dependencies;
use crate::error::BoxError;
use crate::state::StateView;

/// Shared compute function of a computed property.
pub type ComputeFn =
    Arc<dyn Fn(&StateView<'_>) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Define a [`Computed`] from a closure, capturing its source text for
/// dependency extraction.
///
/// The closure body may use `?`; its value is converted with
/// `Into<serde_json::Value>`.
#[macro_export]
macro_rules! computed {
    (|$state:ident| $body:expr) => {
        $crate::Computed::try_new(move |$state| {
            ::core::result::Result::Ok(::core::convert::Into::<$crate::Value>::into($body))
        })
        .with_source(stringify!($state), stringify!($body))
    };
}

/// Definition of a computed property.
#[derive(Clone)]
pub struct Computed {
    compute: ComputeFn,
    receiver: Cow<'static, str>,
    source: Option<Cow<'static, str>>,
    declared: IndexSet<String>,
}

impl Computed {
    /// Computed property from an infallible function.
    ///
    /// Without [`with_source`](Self::with_source) or
    /// [`depends_on`](Self::depends_on) the property is non-reactive.
    pub fn new<F, V>(compute: F) -> Self
    where
        F: Fn(&StateView<'_>) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Self::try_new(move |state| Ok(compute(state).into()))
    }

    /// Computed property from a fallible function.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn(&StateView<'_>) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(compute),
            receiver: Cow::Borrowed("state"),
            source: None,
            declared: IndexSet::new(),
        }
    }

    /// Attach the definition's source text and the name its state receiver
    /// is bound to.
    pub fn with_source(
        mut self,
        receiver: impl Into<Cow<'static, str>>,
        source: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.receiver = receiver.into();
        self.source = Some(source.into());
        self
    }

    /// Declare dependencies the source scan cannot see.
    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Extracted dependencies followed by declared ones.
    pub fn dependencies(&self) -> IndexSet<String> {
        let mut deps = match &self.source {
            Some(source) => extract_dependencies(source, &self.receiver),
            None => IndexSet::new(),
        };
        deps.extend(self.declared.iter().cloned());
        deps
    }

    /// Source text, if attached.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Evaluate against `state`.
    pub fn compute(&self, state: &StateView<'_>) -> std::result::Result<Value, BoxError> {
        (self.compute)(state)
    }

    pub(crate) fn compute_fn(&self) -> ComputeFn {
        Arc::clone(&self.compute)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("receiver", &self.receiver)
            .field("source", &self.source)
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

struct Entry {
    compute: ComputeFn,
    dependencies: IndexSet<String>,
}

/// Computed properties by name, in registration order.
#[derive(Default)]
pub struct ComputedRegistry {
    entries: IndexMap<String, Entry>,
}

impl ComputedRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition` under `name` and return its dependency set.
    ///
    /// Re-registering a name keeps its position and replaces the
    /// definition and dependencies.
    pub fn register(&mut self, name: impl Into<String>, definition: &Computed) -> &IndexSet<String> {
        let entry = Entry {
            compute: definition.compute_fn(),
            dependencies: definition.dependencies(),
        };
        let (index, _) = self.entries.insert_full(name.into(), entry);
        &self.entries[index].dependencies
    }

    /// Remove `name`. Returns whether it was registered.
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

    /// Properties whose dependencies intersect `changed`, in registration
    /// order, with their compute functions.
    pub fn dependents_of<'k>(
        &self,
        changed: impl IntoIterator<Item = &'k str>,
    ) -> Vec<(String, ComputeFn)> {
        let changed: IndexSet<&str> = changed.into_iter().collect();
        if changed.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .dependencies
                    .iter()
                    .any(|dep| changed.contains(dep.as_str()))
            })
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.compute)))
            .collect()
    }

    /// Check if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Dependencies recorded for `name`.
    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<String>> {
        self.entries.get(name).map(|entry| &entry.dependencies)
    }

    /// Whether `name` is registered with at least one dependency.
    pub fn is_reactive(&self, name: &str) -> bool {
        self.dependencies(name).is_some_and(|deps| !deps.is_empty())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of registered computed properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no computed properties are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
