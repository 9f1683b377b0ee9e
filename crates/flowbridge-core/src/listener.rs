//! Listener spec extraction from workflow definitions.
//!
//! A workflow opts into event delivery by making its first step a
//! "listen-to-event" marker whose `events` and `filters` inputs are bound to
//! static values. Everything else about the definition is ignored.
//!
//! Extraction is tolerant: a definition that lacks any expected field is
//! skipped (`None`), never treated as an error.

use std::collections::BTreeSet;

use serde_json::Value;

use flowbridge_types::listener::ListenerSpec;

/// Summary tag that marks a step as a listener declaration.
pub const LISTEN_TO_EVENT_TAG: &str = "listen-to-event";

/// Input transform type for values fixed at authoring time.
const STATIC_INPUT: &str = "static";

/// Strip one leading escape character from an event name.
///
/// Event class names are often authored in escaped-reference form
/// (`\OCP\Files\...`); the host expects the canonical form.
pub fn canonical_event_name(raw: &str) -> &str {
    raw.strip_prefix('\\').unwrap_or(raw)
}

/// Normalize a filter expression for comparison and registration.
///
/// `null`, `{}` and `[]` all become `[]`. Numbers with an integral float
/// representation become integers so `1.0` and `1` compare equal. Object key
/// order never matters because objects compare as maps.
pub fn normalize_filter(value: &Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Object(map) if map.is_empty() => Value::Array(Vec::new()),
        other => canonical_numbers(other),
    }
}

/// Value equality after [`normalize_filter`].
pub fn filters_equal(a: &Value, b: &Value) -> bool {
    normalize_filter(a) == normalize_filter(b)
}

fn canonical_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical_numbers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Extract the listener spec declared by a workflow definition, if any.
///
/// `invoke_base` is the engine URL prefix under which flows are run
/// (`{engine}/api/w/{workspace}/jobs/run/f`); the flow `path` is appended.
pub fn extract_listener_spec(definition: &Value, path: &str, invoke_base: &str) -> Option<ListenerSpec> {
    let Some(first) = definition.pointer("/value/modules/0") else {
        tracing::debug!(%path, "workflow has no steps, skipping");
        return None;
    };

    if first.get("summary").and_then(Value::as_str) != Some(LISTEN_TO_EVENT_TAG) {
        return None;
    }

    let Some(transforms) = first.pointer("/value/input_transforms") else {
        tracing::debug!(%path, "listener step has no input transforms, skipping");
        return None;
    };

    let (Some(events), Some(filters)) = (
        static_input(transforms, "events"),
        static_input(transforms, "filters"),
    ) else {
        tracing::debug!(%path, "listener inputs are not statically bound, skipping");
        return None;
    };

    Some(ListenerSpec {
        uri: format!("{}/{}", invoke_base.trim_end_matches('/'), path),
        events: event_names(events),
        filters: normalize_filter(filters),
    })
}

/// The bound value of a static input transform, `None` if the input is
/// missing or computed at run time.
fn static_input<'a>(transforms: &'a Value, name: &str) -> Option<&'a Value> {
    let input = transforms.get(name)?;
    if input.get("type").and_then(Value::as_str) != Some(STATIC_INPUT) {
        return None;
    }
    Some(input.get("value").unwrap_or(&Value::Null))
}

fn event_names(value: &Value) -> BTreeSet<String> {
    match value {
        Value::String(single) => std::iter::once(single.as_str())
            .map(canonical_event_name)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(canonical_event_name)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}
