//! Static dependency extraction for computed properties.
//!
//! A computed definition's dependencies are inferred from its source text:
//! every access qualified by the definition's receiver name counts as a read
//! of that state property. Recognised forms, with any whitespace between
//! tokens:
//!
//! - `state.count` (field access, not followed by a call)
//! - `state["count"]` and `state['count']`
//! - `state.get("count")` (any method whose first argument is a literal key)
//!
//! This is a syntactic approximation. Keys built at runtime, receivers bound
//! to another name, and reads performed inside helper functions are
//! invisible to it, so the result may miss dependencies. Such properties can
//! declare them explicitly with
//! [`Computed::depends_on`](crate::Computed::depends_on). An empty result is
//! not an error: the property is seeded once and never recomputed.

use indexmap::IndexSet;
use regex::Regex;
use std::sync::LazyLock;

static CALL_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:::\s*<[^()]*>\s*)?\(\s*["']([A-Za-z_$][\w$]*)["']"#)
        .expect("literal pattern is valid")
});

/// Extract the state property names `source` reads through `receiver`.
///
/// Names are returned in order of first appearance, without duplicates.
pub fn extract_dependencies(source: &str, receiver: &str) -> IndexSet<String> {
    let mut deps = IndexSet::new();
    let receiver = receiver.trim();
    if receiver.is_empty() {
        return deps;
    }

    let pattern = format!(
        r#"(?:^|[^\w$.])(?:{receiver})\s*(?:\.\s*(?P<field>[A-Za-z_$][\w$]*)|\[\s*["'](?P<key>[A-Za-z_$][\w$]*)["']\s*\])"#,
        receiver = regex::escape(receiver)
    );
    let Ok(access) = Regex::new(&pattern) else {
        return deps;
    };

    for caps in access.captures_iter(source) {
        if let Some(key) = caps.name("key") {
            deps.insert(key.as_str().to_string());
        } else if let Some(field) = caps.name("field") {
            let rest = &source[field.end()..];
            if is_call(rest) {
                if let Some(arg) = CALL_KEY.captures(rest).and_then(|c| c.get(1)) {
                    deps.insert(arg.as_str().to_string());
                }
            } else {
                deps.insert(field.as_str().to_string());
            }
        }
    }
    deps
}

fn is_call(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.starts_with('(') || rest.starts_with("::")
}
