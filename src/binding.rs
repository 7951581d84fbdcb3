//! Mustache Bindings
//!
//! Scans and resolves `{{expr}}` references inside arbitrary JSON values. The
//! expression language is a bare key or dotted key path; there are no operators
//! or filters.
//!
//! Two kinds of objects are never treated as data:
//! - atom wrappers (`{"$atom": true, "value": ...}`) are skipped by the scanner
//!   and resolve to their `value`
//! - external elements (objects carrying `$$typeof`) pass through untouched

use crate::atoms::AtomStore;
use serde_json::{Map, Value};

/// Marker key of a serialized atom wrapper
pub const ATOM_MARKER: &str = "$atom";

/// Marker key of an already-rendered external element
pub const ELEMENT_MARKER: &str = "$$typeof";

/// A `{{expr}}` occurrence inside a string
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mustache<'a> {
    start: usize,
    end: usize,
    expr: &'a str,
}

fn mustaches(text: &str) -> Vec<Mustache<'_>> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(open) = text[cursor..].find("{{") {
        let start = cursor + open;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        let expr = text[start + 2..end - 2].trim();
        if !expr.is_empty() {
            found.push(Mustache { start, end, expr });
        }
        cursor = end;
    }
    found
}

pub fn is_atom_like(object: &Map<String, Value>) -> bool {
    object.contains_key(ATOM_MARKER)
}

pub fn is_external_element(object: &Map<String, Value>) -> bool {
    object.contains_key(ELEMENT_MARKER)
}

/// Collect every binding expression in `value`, in first-seen order.
pub fn extract_keys(value: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    collect_keys(value, &mut keys);
    keys
}

fn collect_keys(value: &Value, keys: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            for mustache in mustaches(text) {
                if !keys.iter().any(|k| k == mustache.expr) {
                    keys.push(mustache.expr.to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_keys(item, keys)),
        Value::Object(object) if is_atom_like(object) || is_external_element(object) => {}
        Value::Object(object) => object.values().for_each(|v| collect_keys(v, keys)),
        _ => {}
    }
}

/// Key of a pure single-expression binding (`"{{user.name}}"`), used for two-way sync.
pub fn binding_key(value: &Value) -> Option<&str> {
    let text = value.as_str()?;
    let found = mustaches(text);
    match found.as_slice() {
        [only] if only.start == 0 && only.end == text.len() => Some(only.expr),
        _ => None,
    }
}

/// Look up an expression: the full key first, then the first segment with a
/// path walk into the remainder.
pub fn lookup(store: &dyn AtomStore, expr: &str) -> Option<Value> {
    if let Some(value) = store.get(expr) {
        return Some(value);
    }
    let (head, rest) = expr.split_once('.')?;
    let root = store.get(head)?;
    let pointer = format!("/{}", rest.replace('.', "/"));
    root.pointer(&pointer).cloned()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve every binding in `value` against `store`.
///
/// An exact `"{{expr}}"` yields the typed value (`Null` when unresolved);
/// embedded expressions are interpolated with unresolved keys as empty text.
pub fn resolve(value: &Value, store: &dyn AtomStore) -> Value {
    match value {
        Value::String(text) => resolve_text(text, store),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, store)).collect()),
        Value::Object(object) if is_external_element(object) => value.clone(),
        Value::Object(object) if is_atom_like(object) => {
            object.get("value").cloned().unwrap_or(Value::Null)
        }
        Value::Object(object) => Value::Object(resolve_map(object, store)),
        _ => value.clone(),
    }
}

pub fn resolve_map(object: &Map<String, Value>, store: &dyn AtomStore) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| (key.clone(), resolve(value, store)))
        .collect()
}

fn resolve_text(text: &str, store: &dyn AtomStore) -> Value {
    let found = mustaches(text);
    if found.is_empty() {
        return Value::String(text.to_string());
    }
    if let [only] = found.as_slice() {
        if only.start == 0 && only.end == text.len() {
            return lookup(store, only.expr).unwrap_or(Value::Null);
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for mustache in found {
        out.push_str(&text[cursor..mustache.start]);
        if let Some(value) = lookup(store, mustache.expr) {
            out.push_str(&stringify(&value));
        }
        cursor = mustache.end;
    }
    out.push_str(&text[cursor..]);
    Value::String(out)
}
