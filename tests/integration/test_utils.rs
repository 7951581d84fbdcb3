//! Shared helpers for building entity stores and patches in tests

use serde_json::{Map, Value};
use tessera::{EntityStore, Patch};

/// Build a store from an id-keyed JSON object or an array of records
pub fn entities(value: Value) -> EntityStore {
    EntityStore::from_value(value).expect("test entities must be valid")
}

pub fn patch(id: &str, data: Value) -> Patch {
    let data: Map<String, Value> = data.as_object().cloned().unwrap_or_default();
    Patch::new(id, data)
}

/// A linear parent chain `n0 <- n1 <- ... <- n{len-1}`
pub fn chain(len: usize) -> EntityStore {
    let mut records = Vec::with_capacity(len);
    for i in 0..len {
        let mut record = serde_json::json!({"id": format!("n{i}"), "type": "Box"});
        if i > 0 {
            record["parent"] = Value::String(format!("n{}", i - 1));
        }
        records.push(record);
    }
    entities(Value::Array(records))
}
