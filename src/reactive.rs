//! The reactive store instance and its construction.
//!
//! A [`ReactiveStore`] owns its computed and watcher registries and its
//! settings, wraps a [`StateStore`] backend, and routes every mutation
//! through the pipeline (see [`ReactiveStore::mutate`]). Handles are cheap
//! to clone and share one instance.

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::computed::{Computed, ComputedRegistry};
use crate::config::{LogLevel, Settings};
use crate::error::{Result, StateError};
use crate::memory::MemoryStore;
use crate::state::{
    into_state, parse_selection, pick, Delta, MutationRequest, SetOptions, State, StateView,
};
use crate::store::StateStore;
use crate::watch::{ChangeStream, SelectionStream};
use crate::watchers::{Watcher, WatcherRegistry};

/// Produces the initial state of a store.
pub type Initializer = Box<dyn FnOnce(&ReactiveStore) -> Value>;

/// Wraps an [`Initializer`]. Middleware is applied in registration order,
/// each one wrapping the result of the previous.
pub type Middleware = Box<dyn FnOnce(Initializer) -> Initializer>;

pub(crate) struct Inner {
    pub(crate) api: Arc<dyn StateStore>,
    pub(crate) computed: RwLock<ComputedRegistry>,
    pub(crate) watchers: RwLock<WatcherRegistry>,
    pub(crate) settings: Settings,
    pub(crate) ready: AtomicBool,
    depth: AtomicUsize,
    logged_depth: AtomicUsize,
}

/// Tracks the nesting of one pipeline pass.
pub(crate) struct PassGuard<'a> {
    depth: &'a AtomicUsize,
    level: usize,
}

impl PassGuard<'_> {
    pub(crate) fn is_outermost(&self) -> bool {
        self.level == 1
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Inner {
    pub(crate) fn enter_pass(&self) -> Result<PassGuard<'_>> {
        let level = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        let guard = PassGuard {
            depth: &self.depth,
            level,
        };
        match self.settings.max_pass_depth {
            Some(limit) if level > limit => Err(StateError::PassDepthExceeded { limit }),
            _ => Ok(guard),
        }
    }

    /// Enter a pass that emits log records. Nested in [`enter_pass`](Self::enter_pass),
    /// so it needs no limit of its own.
    pub(crate) fn enter_logged_pass(&self) -> PassGuard<'_> {
        let level = self.logged_depth.fetch_add(1, Ordering::AcqRel) + 1;
        PassGuard {
            depth: &self.logged_depth,
            level,
        }
    }
}

/// A key-value store with computed properties and watchers.
#[derive(Clone)]
pub struct ReactiveStore {
    pub(crate) inner: Arc<Inner>,
}

impl ReactiveStore {
    /// Start configuring a store.
    pub fn builder() -> ReactiveStoreBuilder {
        ReactiveStoreBuilder::default()
    }

    /// Build a store from `initializer` with no computed properties,
    /// watchers or middleware.
    pub fn new(initializer: impl FnOnce(&ReactiveStore) -> Value + 'static) -> Result<Self> {
        Self::builder().build(initializer)
    }

    /// Merge `delta` into the state.
    pub fn set(&self, delta: Value) -> Result<()> {
        self.mutate(MutationRequest::merge(delta))
    }

    /// Apply `delta` with explicit options (a `bool` means replace).
    pub fn set_with(&self, delta: Value, options: impl Into<SetOptions>) -> Result<()> {
        self.mutate(MutationRequest::merge(delta).with_options(options))
    }

    /// Merge the delta `f` derives from the current state.
    pub fn update<'a>(&self, f: impl FnOnce(&State) -> Value + 'a) -> Result<()> {
        self.mutate(MutationRequest::merge(Delta::update(f)))
    }

    /// Replace the whole state.
    pub fn replace(&self, state: Value) -> Result<()> {
        self.mutate(MutationRequest::replace(state))
    }

    /// Apply `partial`, replacing the whole state when `replace` is set.
    pub fn set_state(&self, partial: Value, replace: bool) -> Result<()> {
        self.set_with(partial, replace)
    }

    /// Serialize `value` and merge it under `key`.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut delta = State::new();
        delta.insert(key.to_string(), serde_json::to_value(value)?);
        self.mutate(MutationRequest::merge(delta))
    }

    /// Snapshot of the whole state.
    pub fn get_state(&self) -> State {
        self.inner.api.get_state()
    }

    /// Get a single property.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.api.get(key)
    }

    /// Get a property and deserialize it.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Apply a selector to the current state.
    pub fn select<T>(&self, selector: impl FnOnce(&State) -> T) -> T {
        selector(&self.get_state())
    }

    /// Values of the comma-separated properties in `selection`, in the order
    /// given. Missing properties read as `Null`.
    pub fn pick(&self, selection: &str) -> Vec<Value> {
        pick(&self.get_state(), &parse_selection(selection))
    }

    /// Stream of every write applied to the backend.
    pub fn subscribe(&self) -> ChangeStream {
        self.inner.api.subscribe()
    }

    /// Stream of the comma-separated properties in `selection`, yielding
    /// whenever any of them changes value.
    pub fn watch_selection(&self, selection: &str) -> SelectionStream {
        let keys = parse_selection(selection);
        let stream = self.subscribe();
        stream.select(&keys, &self.get_state())
    }

    /// End every subscription.
    pub fn destroy(&self) {
        self.inner.api.destroy();
    }

    /// The backend, bypassing the pipeline.
    pub fn api(&self) -> &Arc<dyn StateStore> {
        &self.inner.api
    }

    /// Settings this instance was built with.
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Whether construction, including seeding, has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Register a computed property and seed its value.
    ///
    /// The seed is written through the pipeline, excluded from logs, so
    /// properties depending on `name` and a watcher on `name` react to it.
    pub fn add_computed(&self, name: impl Into<String>, definition: Computed) -> Result<()> {
        let name = name.into();
        let current = self.get_state();
        let value = definition
            .compute(&StateView::new(&current))
            .map_err(|source| StateError::Computed {
                name: name.clone(),
                source,
            })?;
        self.inner.computed.write().register(name.clone(), &definition);

        let mut seed = State::new();
        seed.insert(name, value);
        self.mutate(MutationRequest::merge(seed).quiet())
    }

    /// Unregister a computed property. Its last value stays in the state.
    pub fn remove_computed(&self, name: &str) -> bool {
        self.inner.computed.write().unregister(name)
    }

    /// Register a watcher, replacing any previous one for `name`.
    pub fn add_watcher(&self, name: impl Into<String>, watcher: Watcher) {
        self.inner.watchers.write().register(name, &watcher);
    }

    /// Unregister the watcher for `name`, if any.
    pub fn remove_watcher(&self, name: &str) -> bool {
        self.inner.watchers.write().unregister(name)
    }

    /// Computed property names in registration order.
    pub fn computed_names(&self) -> Vec<String> {
        self.inner.computed.read().names()
    }

    /// Watched property names in registration order.
    pub fn watcher_names(&self) -> Vec<String> {
        self.inner.watchers.read().names()
    }

    /// Dependencies recorded for a computed property.
    pub fn dependencies_of(&self, name: &str) -> Option<IndexSet<String>> {
        self.inner.computed.read().dependencies(name).cloned()
    }

    /// Seed every definition in order, each seeing the values seeded before
    /// it, then write them with one merge that bypasses the pipeline.
    fn seed(&self, definitions: &IndexMap<String, Computed>) -> Result<()> {
        let current = self.get_state();
        let mut seeded = State::new();
        for (name, definition) in definitions {
            let deps = self
                .inner
                .computed
                .write()
                .register(name.clone(), definition)
                .clone();
            if deps.is_empty() {
                debug!(store = %self.inner.settings.name, computed = %name, "no dependencies found, seeding only");
            }
            let value = definition
                .compute(&StateView::layered([&current, &seeded]))
                .map_err(|source| StateError::Computed {
                    name: name.clone(),
                    source,
                })?;
            seeded.insert(name.clone(), value);
        }
        if !seeded.is_empty() {
            self.inner.api.set_state(seeded, false);
        }
        Ok(())
    }
}

impl fmt::Debug for ReactiveStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveStore")
            .field("name", &self.inner.settings.name)
            .field("computed", &self.computed_names())
            .field("watchers", &self.watcher_names())
            .finish_non_exhaustive()
    }
}

/// Configuration of a [`ReactiveStore`].
#[derive(Default)]
pub struct ReactiveStoreBuilder {
    computed: IndexMap<String, Computed>,
    watchers: IndexMap<String, Watcher>,
    middleware: Vec<Middleware>,
    settings: Settings,
    backend: Option<Arc<dyn StateStore>>,
}

impl ReactiveStoreBuilder {
    /// Add a computed property. Properties are seeded and recomputed in the
    /// order they are added.
    pub fn computed(mut self, name: impl Into<String>, definition: Computed) -> Self {
        self.computed.insert(name.into(), definition);
        self
    }

    /// Add a watcher.
    pub fn watcher(mut self, name: impl Into<String>, watcher: Watcher) -> Self {
        self.watchers.insert(name.into(), watcher);
        self
    }

    /// Wrap the initializer.
    pub fn middleware(mut self, middleware: impl FnOnce(Initializer) -> Initializer + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Replace all settings at once.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Instance name shown in log records.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = name.into();
        self
    }

    /// Tracing level for mutation cycles.
    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.settings.log_level = log_level;
        self
    }

    /// Nesting limit for pipeline passes. `None` removes it.
    pub fn max_pass_depth(mut self, max_pass_depth: Option<usize>) -> Self {
        self.settings.max_pass_depth = max_pass_depth;
        self
    }

    /// Use `backend` instead of a fresh [`MemoryStore`]. Its state is
    /// replaced by the initializer's.
    pub fn backend(mut self, backend: Arc<dyn StateStore>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Create the store: run the (wrapped) initializer, seed computed
    /// properties, register watchers, and enable logging.
    pub fn build(
        self,
        initializer: impl FnOnce(&ReactiveStore) -> Value + 'static,
    ) -> Result<ReactiveStore> {
        let ReactiveStoreBuilder {
            computed,
            watchers,
            middleware,
            settings,
            backend,
        } = self;

        let store = ReactiveStore {
            inner: Arc::new(Inner {
                api: backend.unwrap_or_else(|| Arc::new(MemoryStore::new())),
                computed: RwLock::new(ComputedRegistry::new()),
                watchers: RwLock::new(WatcherRegistry::new()),
                settings,
                ready: AtomicBool::new(false),
                depth: AtomicUsize::new(0),
                logged_depth: AtomicUsize::new(0),
            }),
        };

        let initializer = middleware
            .into_iter()
            .fold(Box::new(initializer) as Initializer, |init, wrap| wrap(init));
        let initial = into_state(initializer(&store))?;
        store.inner.api.set_state(initial, true);

        store.seed(&computed)?;

        {
            let mut registry = store.inner.watchers.write();
            for (name, watcher) in &watchers {
                registry.register(name.clone(), watcher);
            }
        }

        store.inner.ready.store(true, Ordering::Release);
        info!(
            store = %store.inner.settings.name,
            computed = computed.len(),
            watchers = watchers.len(),
            "reactive store ready"
        );
        Ok(store)
    }
}
