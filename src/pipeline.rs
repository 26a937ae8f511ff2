//! The mutation pipeline.
//!
//! One pass, in order:
//!
//! 1. resolve the delta against the current state
//! 2. recompute, in registration order, every computed property depending
//!    on a changed key; each sees the current state overlaid with the delta
//!    and with the values recomputed before it (skipped when replacing)
//! 3. on replace, drop computed properties and watchers whose name is absent
//!    from the new state
//! 4. write delta and recomputed values to the backend in one call
//! 5. invoke the watchers of properties whose value changed
//! 6. if anything was recomputed, run a nested merge pass with the
//!    recomputed values so chained computed properties and watchers on them
//!    settle before control returns
//!
//! Errors from computed or watcher callbacks end the pass immediately.
//! Nothing is rolled back: a write made in step 4 stays.
//!
//! Watchers may call back into the store. Such calls run as nested passes
//! against the same registries. Dependency cycles between computed
//! properties are not detected; they recurse until
//! [`Settings::max_pass_depth`](crate::Settings::max_pass_depth) is exceeded.

use std::sync::atomic::Ordering;
use tracing::debug;

use crate::error::{Result, StateError};
use crate::logging::PassLog;
use crate::reactive::{PassGuard, ReactiveStore};
use crate::state::{Delta, MutationRequest, SetOptions, State, StateView};
use crate::watchers::Triggered;

impl ReactiveStore {
    /// Apply a mutation and let computed properties and watchers react to
    /// it. Returns once every nested pass has completed.
    pub fn mutate(&self, request: MutationRequest<'_>) -> Result<()> {
        self.run_pass(request.delta, request.options)
    }

    fn run_pass(&self, delta: Delta<'_>, options: SetOptions) -> Result<()> {
        let inner = &*self.inner;
        let _pass = inner.enter_pass()?;

        let current = inner.api.get_state();
        let changes = delta.resolve(&current)?;

        let enabled = inner.ready.load(Ordering::Acquire) && !options.exclude_from_logs;
        // Group markers belong to the outermost logged pass, which is not
        // the outermost pass when a quiet request triggers a logged one.
        let logged = enabled.then(|| inner.enter_logged_pass());
        let log = PassLog::begin(
            &inner.settings,
            enabled,
            logged.as_ref().is_some_and(PassGuard::is_outermost),
            &current,
            &changes,
        );

        let mut recomputed = State::new();
        if !options.replace {
            let dependents = inner
                .computed
                .read()
                .dependents_of(changes.keys().map(String::as_str));
            for (name, compute) in dependents {
                let value = compute(&StateView::layered([&current, &changes, &recomputed]))
                    .map_err(|source| StateError::Computed {
                        name: name.clone(),
                        source,
                    })?;
                recomputed.insert(name, value);
            }
            log.recomputed(&recomputed);
        }

        let mut applied = changes;
        for (name, value) in &recomputed {
            applied.insert(name.clone(), value.clone());
        }
        if options.replace {
            self.prune(&applied);
        }

        inner.api.set_state(applied.clone(), options.replace);

        let triggered = inner.watchers.read().changed_of(&current, &applied);
        for Triggered {
            name,
            callback,
            old,
            new,
        } in triggered
        {
            // A replace made by an earlier watcher may have dropped this one.
            if !inner.watchers.read().contains(&name) {
                continue;
            }
            log.watcher(&name);
            callback(&new, old.as_ref(), self).map_err(|source| StateError::Watcher { name, source })?;
        }

        if !options.replace {
            // Nested passes run by watchers may have pruned a property or
            // committed a newer value for it. Only values still current are
            // settled here.
            {
                let computed = inner.computed.read();
                recomputed.retain(|name, value| {
                    computed.contains(name) && inner.api.get(name).as_ref() == Some(&*value)
                });
            }
            if !recomputed.is_empty() {
                let cascade = SetOptions {
                    replace: false,
                    exclude_from_logs: options.exclude_from_logs,
                };
                self.run_pass(Delta::from(recomputed), cascade)?;
            }
        }

        log.finish(|| inner.api.get_state());
        Ok(())
    }

    /// Drop registrations that have no property in `state`.
    fn prune(&self, state: &State) {
        let inner = &*self.inner;
        let computed = inner.computed.write().retain(|name| state.contains_key(name));
        let watchers = inner.watchers.write().retain(|name| state.contains_key(name));
        if !computed.is_empty() || !watchers.is_empty() {
            debug!(
                store = %inner.settings.name,
                ?computed,
                ?watchers,
                "dropped registrations absent from replaced state"
            );
        }
    }
}
