//! State, views over state, and mutation requests.
//!
//! - [`State`]: property name to JSON value, insertion ordered
//! - [`StateView`]: read-only overlay of several state layers, used as the
//!   explicit receiver of computed definitions
//! - [`MutationRequest`]: a delta plus [`SetOptions`], consumed by one
//!   pipeline pass

use serde_json::{Map, Value};
use std::fmt;
use std::ops::Index;

use crate::error::{Result, StateError};

/// A mapping from property name to value.
pub type State = Map<String, Value>;

static NULL: Value = Value::Null;

/// Read-only view composed of state layers.
///
/// Lookups search the layers from last to first, so later layers shadow
/// earlier ones. Indexing a missing key yields [`Value::Null`], the same way
/// indexing a [`Value`] does.
#[derive(Clone)]
pub struct StateView<'a> {
    layers: Vec<&'a State>,
}

impl<'a> StateView<'a> {
    /// View over a single state.
    pub fn new(state: &'a State) -> Self {
        Self {
            layers: vec![state],
        }
    }

    /// View over `layers`, the last one winning on key collisions.
    pub fn layered(layers: impl IntoIterator<Item = &'a State>) -> Self {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Look up a property.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.layers.iter().rev().copied().find_map(|layer| layer.get(key))
    }

    /// Check whether any layer holds `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Flatten the layers into an owned state.
    pub fn to_state(&self) -> State {
        let mut state = State::new();
        for layer in &self.layers {
            for (key, value) in layer.iter() {
                state.insert(key.clone(), value.clone());
            }
        }
        state
    }
}

impl<'a> Index<&str> for StateView<'a> {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NULL)
    }
}

impl fmt::Debug for StateView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.to_state()).finish()
    }
}

/// How a mutation is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Substitute the whole state instead of merging key-wise.
    pub replace: bool,
    /// Skip mutation tracing for this call.
    pub exclude_from_logs: bool,
}

impl SetOptions {
    /// Key-wise merge (the default).
    pub fn merge() -> Self {
        Self::default()
    }

    /// Whole-state replacement.
    pub fn replace() -> Self {
        Self {
            replace: true,
            ..Self::default()
        }
    }

    /// Same options, excluded from logs.
    pub fn quiet(self) -> Self {
        Self {
            exclude_from_logs: true,
            ..self
        }
    }
}

impl From<bool> for SetOptions {
    fn from(replace: bool) -> Self {
        Self {
            replace,
            exclude_from_logs: false,
        }
    }
}

/// The change requested by a mutation.
pub enum Delta<'a> {
    /// A concrete partial state. Must be a JSON object.
    Partial(Value),
    /// Computed from the current state when the pass starts.
    Update(Box<dyn FnOnce(&State) -> Value + 'a>),
}

impl<'a> Delta<'a> {
    /// Build a functional delta.
    pub fn update(f: impl FnOnce(&State) -> Value + 'a) -> Self {
        Delta::Update(Box::new(f))
    }

    /// Produce the concrete partial state for `current`.
    pub fn resolve(self, current: &State) -> Result<State> {
        let value = match self {
            Delta::Partial(value) => value,
            Delta::Update(f) => f(current),
        };
        into_state(value)
    }
}

impl From<Value> for Delta<'_> {
    fn from(value: Value) -> Self {
        Delta::Partial(value)
    }
}

impl From<State> for Delta<'_> {
    fn from(state: State) -> Self {
        Delta::Partial(Value::Object(state))
    }
}

impl fmt::Debug for Delta<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::Partial(value) => f.debug_tuple("Partial").field(value).finish(),
            Delta::Update(_) => f.write_str("Update(..)"),
        }
    }
}

/// A single call into the mutation pipeline.
#[derive(Debug)]
pub struct MutationRequest<'a> {
    pub delta: Delta<'a>,
    pub options: SetOptions,
}

impl<'a> MutationRequest<'a> {
    /// Merge `delta` into the current state.
    pub fn merge(delta: impl Into<Delta<'a>>) -> Self {
        Self {
            delta: delta.into(),
            options: SetOptions::merge(),
        }
    }

    /// Replace the whole state with `delta`.
    pub fn replace(delta: impl Into<Delta<'a>>) -> Self {
        Self {
            delta: delta.into(),
            options: SetOptions::replace(),
        }
    }

    /// Override the options of this request.
    pub fn with_options(mut self, options: impl Into<SetOptions>) -> Self {
        self.options = options.into();
        self
    }

    /// Exclude this request from mutation tracing.
    pub fn quiet(mut self) -> Self {
        self.options = self.options.quiet();
        self
    }
}

/// Convert a JSON value into a state, rejecting non-objects.
pub fn into_state(value: Value) -> Result<State> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StateError::InvalidDelta(format!(
            "expected an object, got {}",
            kind_of(&other)
        ))),
    }
}

/// Split a comma-separated property list, trimming each name.
pub fn parse_selection(selection: &str) -> Vec<String> {
    selection
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Values of `keys` in `state`, in input order; missing keys yield `Null`.
pub fn pick(state: &State, keys: &[String]) -> Vec<Value> {
    keys.iter()
        .map(|key| state.get(key).cloned().unwrap_or(Value::Null))
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: Value) -> State {
        into_state(value).unwrap()
    }

    #[test]
    fn test_view_later_layers_win() {
        let base = state(json!({"count": 1, "name": "a"}));
        let delta = state(json!({"count": 2}));
        let view = StateView::layered([&base, &delta]);

        assert_eq!(view["count"], json!(2));
        assert_eq!(view["name"], json!("a"));
        assert!(view.contains_key("name"));
    }

    #[test]
    fn test_view_missing_key_is_null() {
        let base = state(json!({"count": 1}));
        let view = StateView::new(&base);

        assert_eq!(view["missing"], Value::Null);
        assert!(view.get("missing").is_none());
        assert!(!view.contains_key("missing"));
    }

    #[test]
    fn test_view_to_state() {
        let base = state(json!({"a": 1, "b": 2}));
        let top = state(json!({"b": 3, "c": 4}));
        let flat = StateView::layered([&base, &top]).to_state();

        assert_eq!(Value::Object(flat), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_delta_resolve_partial() {
        let current = State::new();
        let resolved = Delta::from(json!({"count": 5})).resolve(&current).unwrap();
        assert_eq!(resolved["count"], json!(5));
    }

    #[test]
    fn test_delta_resolve_function() {
        let current = state(json!({"count": 5}));
        let delta = Delta::update(|s| json!({"count": s["count"].as_i64().unwrap_or(0) + 1}));
        let resolved = delta.resolve(&current).unwrap();
        assert_eq!(resolved["count"], json!(6));
    }

    #[test]
    fn test_delta_rejects_non_object() {
        let err = Delta::from(json!(3)).resolve(&State::new()).unwrap_err();
        assert!(matches!(err, StateError::InvalidDelta(_)));
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn test_set_options() {
        assert_eq!(SetOptions::from(true), SetOptions::replace());
        assert_eq!(SetOptions::from(false), SetOptions::merge());

        let quiet = SetOptions::replace().quiet();
        assert!(quiet.replace);
        assert!(quiet.exclude_from_logs);

        let request = MutationRequest::merge(json!({})).with_options(true).quiet();
        assert!(request.options.replace);
        assert!(request.options.exclude_from_logs);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection("count, doubleCount ,total"),
            vec!["count", "doubleCount", "total"]
        );
        assert_eq!(parse_selection("count"), vec!["count"]);
        assert!(parse_selection(" , ").is_empty());
    }

    #[test]
    fn test_pick_keeps_input_order() {
        let s = state(json!({"a": 1, "b": 2}));
        let keys = parse_selection("b, missing, a");
        assert_eq!(pick(&s, &keys), vec![json!(2), Value::Null, json!(1)]);
    }
}
