//! Error types for reactive state operations.
//!
//! Computed and watcher callbacks fail with any error type boxed into a
//! [`BoxError`]; the pipeline wraps it with the name of the definition that
//! raised it. There is no rollback: a store write committed before the
//! failure stays in effect.

use thiserror::Error;

/// Error type returned by user-supplied computed and watcher callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while mutating or reading reactive state.
#[derive(Debug, Error)]
pub enum StateError {
    /// A computed property's definition failed while being evaluated.
    #[error("computed property `{name}` failed: {source}")]
    Computed { name: String, source: BoxError },

    /// A watcher callback failed while being invoked.
    #[error("watcher `{name}` failed: {source}")]
    Watcher { name: String, source: BoxError },

    /// A delta did not resolve to a JSON object.
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// Nested mutation passes exceeded the configured depth.
    #[error("mutation passes nested deeper than {limit}")]
    PassDepthExceeded { limit: usize },

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    /// Returns true if this error was raised by a computed or watcher callback.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            StateError::Computed { .. } | StateError::Watcher { .. }
        )
    }

    /// Name of the computed property or watcher that failed, if any.
    pub fn definition_name(&self) -> Option<&str> {
        match self {
            StateError::Computed { name, .. } | StateError::Watcher { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StateError::Computed {
            name: "doubleCount".to_string(),
            source: "boom".into(),
        };
        assert!(err.to_string().contains("computed property `doubleCount`"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_pass_depth_display() {
        let err = StateError::PassDepthExceeded { limit: 16 };
        assert!(err.to_string().contains("deeper than 16"));
    }

    #[test]
    fn test_definition_errors() {
        let computed = StateError::Computed {
            name: "a".to_string(),
            source: "x".into(),
        };
        let watcher = StateError::Watcher {
            name: "b".to_string(),
            source: "y".into(),
        };
        assert!(computed.is_definition_error());
        assert!(watcher.is_definition_error());
        assert_eq!(computed.definition_name(), Some("a"));
        assert_eq!(watcher.definition_name(), Some("b"));

        let invalid = StateError::InvalidDelta("number".to_string());
        assert!(!invalid.is_definition_error());
        assert_eq!(invalid.definition_name(), None);
        assert!(!StateError::PassDepthExceeded { limit: 1 }.is_definition_error());
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let err = StateError::Watcher {
            name: "total".to_string(),
            source: Box::new(StateError::InvalidDelta("inner".to_string())),
        };
        let source = err.source().expect("watcher error carries its source");
        assert!(source.to_string().contains("inner"));
    }

    #[test]
    fn test_from_serde_json() {
        let err: StateError = serde_json::from_str::<u32>("\"nope\"").unwrap_err().into();
        assert!(matches!(err, StateError::SerializationError(_)));
    }
}
