//! Tracing of mutation cycles.
//!
//! Each outermost logged pass opens a `state_change` span; nested passes
//! (cascades and watcher-triggered mutations) emit their records inside it
//! without opening another one. What is recorded depends on [`LogLevel`]:
//!
//! | record                   | `Diff` | `All` |
//! |--------------------------|--------|-------|
//! | cycle start / complete   | yes    | yes   |
//! | previous state           |        | yes   |
//! | applied delta            | yes    | yes   |
//! | updated computed values  | yes    | yes   |
//! | triggered watcher        | yes    | yes   |
//! | new state                |        | yes   |

use std::fmt;
use tracing::span::EnteredSpan;
use tracing::{info, info_span};

use crate::config::{LogLevel, Settings};
use crate::state::State;

/// Displays a state as compact JSON.
pub(crate) struct Json<'a>(pub &'a State);

impl fmt::Display for Json<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self.0).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Tracing for one pipeline pass.
pub(crate) struct PassLog {
    level: LogLevel,
    outermost: bool,
    span: Option<EnteredSpan>,
}

impl PassLog {
    /// Start tracing a pass. `enabled` is false before the store is ready
    /// and for requests excluded from logs.
    pub(crate) fn begin(
        settings: &Settings,
        enabled: bool,
        outermost: bool,
        previous: &State,
        delta: &State,
    ) -> Self {
        let level = if enabled {
            settings.log_level
        } else {
            LogLevel::None
        };
        let mut log = Self {
            level,
            outermost,
            span: None,
        };
        if !level.is_enabled() {
            return log;
        }

        if outermost {
            log.span = Some(info_span!("state_change", store = %settings.name).entered());
            info!("{} state changed", settings.name);
            if level.shows_snapshots() {
                info!(state = %Json(previous), "previous state");
            }
        }
        info!(delta = %Json(delta), "applying");
        log
    }

    pub(crate) fn recomputed(&self, values: &State) {
        if self.level.is_enabled() && !values.is_empty() {
            info!(values = %Json(values), "updating computed values");
        }
    }

    pub(crate) fn watcher(&self, name: &str) {
        if self.level.is_enabled() {
            info!(watcher = name, "triggering watcher");
        }
    }

    /// Close the pass. `current` is only read when a snapshot is traced.
    pub(crate) fn finish(self, current: impl FnOnce() -> State) {
        if !self.level.is_enabled() || !self.outermost {
            return;
        }
        if self.level.shows_snapshots() {
            info!(state = %Json(&current()), "new state");
        }
        info!("state change complete");
        drop(self.span);
    }
}

#[cfg(test)]
pub(crate) mod capture {
    //! A subscriber layer that records events for assertions.

    use parking_lot::Mutex;
    use std::fmt::Write as _;
    use std::sync::Arc;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::Registry;

    #[derive(Clone, Default)]
    pub(crate) struct Captured(Arc<Mutex<Vec<String>>>);

    impl Captured {
        pub(crate) fn lines(&self) -> Vec<String> {
            self.0.lock().clone()
        }

        pub(crate) fn count(&self, needle: &str) -> usize {
            self.0.lock().iter().filter(|line| line.contains(needle)).count()
        }
    }

    struct Recorder {
        line: String,
    }

    impl Visit for Recorder {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                let _ = write!(self.line, "{value:?}");
            } else {
                let _ = write!(self.line, " {}={value:?}", field.name());
            }
        }
    }

    struct CaptureLayer(Captured);

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut recorder = Recorder {
                line: String::new(),
            };
            event.record(&mut recorder);
            self.0 .0.lock().push(recorder.line);
        }
    }

    /// Run `f` with a capturing subscriber as the thread default.
    pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, Captured) {
        let captured = Captured::default();
        let subscriber = Registry::default().with(CaptureLayer(captured.clone()));
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, captured)
    }
}

#[cfg(test)]
mod tests {
    use super::capture::capture;
    use super::*;
    use crate::state::into_state;
    use serde_json::json;

    fn state(value: serde_json::Value) -> State {
        into_state(value).unwrap()
    }

    fn run(level: LogLevel, enabled: bool, outermost: bool) -> Vec<String> {
        let settings = Settings::new("TestingStore").with_log_level(level);
        let previous = state(json!({"count": 1}));
        let delta = state(json!({"count": 2}));
        let (_, captured) = capture(|| {
            let log = PassLog::begin(&settings, enabled, outermost, &previous, &delta);
            log.recomputed(&state(json!({"doubleCount": 4})));
            log.watcher("count");
            log.finish(|| state(json!({"count": 2, "doubleCount": 4})));
        });
        captured.lines()
    }

    #[test]
    fn test_none_is_silent() {
        assert!(run(LogLevel::None, true, true).is_empty());
    }

    #[test]
    fn test_disabled_is_silent() {
        assert!(run(LogLevel::All, false, true).is_empty());
    }

    #[test]
    fn test_diff_records() {
        let lines = run(LogLevel::Diff, true, true);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("TestingStore state changed"));
        assert!(lines[1].contains("applying"));
        assert!(lines[1].contains(r#"{"count":2}"#));
        assert!(lines[2].contains("updating computed values"));
        assert!(lines[3].contains("triggering watcher"));
        assert!(lines[4].contains("state change complete"));
    }

    #[test]
    fn test_all_adds_snapshots() {
        let lines = run(LogLevel::All, true, true);
        assert_eq!(lines.len(), 7);
        assert!(lines[1].contains("previous state"));
        assert!(lines[1].contains(r#"{"count":1}"#));
        assert!(lines[5].contains("new state"));
        assert!(lines[5].contains(r#""doubleCount":4"#));
    }

    #[test]
    fn test_nested_pass_has_no_markers() {
        let lines = run(LogLevel::All, true, false);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| !line.contains("state changed")));
        assert!(lines.iter().all(|line| !line.contains("complete")));
        assert!(lines.iter().all(|line| !line.contains("previous state")));
    }

    #[test]
    fn test_json_display() {
        let s = state(json!({"a": [1, 2], "b": null}));
        assert_eq!(Json(&s).to_string(), r#"{"a":[1,2],"b":null}"#);
    }
}
