//! # univrs-reactive
//!
//! Reactive key-value state for the Univrs ecosystem.
//!
//! A [`ReactiveStore`] wraps a plain key-value [`StateStore`] and adds:
//!
//! - **Computed properties**: values derived from other properties, kept
//!   consistent by recomputing them when a dependency changes
//! - **Watchers**: callbacks fired when a property changes value
//! - **Traced mutations**: every state change can be traced through
//!   `tracing` at [`LogLevel::Diff`] or [`LogLevel::All`]
//!
//! Every mutation runs through one pipeline: recompute affected computed
//! properties, write the result once, notify watchers, then settle any
//! cascading changes. See [`ReactiveStore::mutate`].
//!
//! ## Quick Start
//!
//! ```rust
//! use univrs_reactive::{computed, json, ReactiveStore, Watcher};
//!
//! fn main() -> univrs_reactive::Result<()> {
//!     let store = ReactiveStore::builder()
//!         .computed(
//!             "doubleCount",
//!             computed!(|state| state["count"].as_i64().unwrap_or_default() * 2),
//!         )
//!         .watcher(
//!             "doubleCount",
//!             Watcher::infallible(|new, old, _| println!("doubleCount: {old:?} -> {new}")),
//!         )
//!         .build(|_| json!({"count": 1}))?;
//!
//!     store.set(json!({"count": 2}))?;
//!     assert_eq!(store.get("doubleCount"), Some(json!(4)));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Dependencies
//!
//! [`computed!`] records the closure's source text, and the properties it
//! reads through its receiver (`state["count"]`, `state.get("count")`) become
//! its dependencies. The scan is syntactic; reads it cannot see can be
//! declared explicitly:
//!
//! ```rust
//! use univrs_reactive::{computed, json, ReactiveStore, StateView};
//!
//! fn count(view: &StateView<'_>) -> i64 {
//!     view["count"].as_i64().unwrap_or_default()
//! }
//!
//! # fn main() -> univrs_reactive::Result<()> {
//! let store = ReactiveStore::builder()
//!     .computed("next", computed!(|state| count(state) + 1).depends_on(["count"]))
//!     .build(|_| json!({"count": 1}))?;
//!
//! store.set(json!({"count": 5}))?;
//! assert_eq!(store.get("next"), Some(json!(6)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Replacing State
//!
//! ```rust
//! use univrs_reactive::{computed, json, ReactiveStore};
//!
//! # fn main() -> univrs_reactive::Result<()> {
//! let store = ReactiveStore::builder()
//!     .computed("doubleCount", computed!(|state| state["count"].as_i64().unwrap_or_default() * 2))
//!     .build(|_| json!({"count": 1}))?;
//!
//! // `doubleCount` is absent from the new state, so its binding is dropped.
//! store.replace(json!({"count": 3}))?;
//! assert!(store.computed_names().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod computed;
pub mod config;
pub mod deps;
pub mod error;
mod logging;
pub mod memory;
mod pipeline;
pub mod reactive;
pub mod state;
pub mod store;
pub mod watch;
pub mod watchers;

// Re-export main types
pub use computed::{ComputeFn, Computed, ComputedRegistry};
pub use config::{LogLevel, Settings};
pub use deps::extract_dependencies;
pub use error::{BoxError, Result, StateError};
pub use memory::MemoryStore;
pub use reactive::{Initializer, Middleware, ReactiveStore, ReactiveStoreBuilder};
pub use serde_json::{json, Value};
pub use state::{Delta, MutationRequest, SetOptions, State, StateView};
pub use store::StateStore;
pub use watch::{ChangeKind, ChangeStream, SelectionStream, StateChange};
pub use watchers::{WatchFn, Watcher, WatcherRegistry};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::computed;
    pub use crate::computed::Computed;
    pub use crate::config::{LogLevel, Settings};
    pub use crate::error::{BoxError, Result, StateError};
    pub use crate::memory::MemoryStore;
    pub use crate::reactive::ReactiveStore;
    pub use crate::state::{MutationRequest, SetOptions, State, StateView};
    pub use crate::store::StateStore;
    pub use crate::watchers::Watcher;
    pub use serde_json::{json, Value};
}
