//! Integration tests for the streaming decoder

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tessera::stream::{repair, SseTransform};
use tessera::{AtomRegistry, AtomStore, DecoderOptions, Patch, Runtime, StreamDecoder, TesseraConfig};

fn collecting(auto_repair: bool) -> (StreamDecoder, Arc<Mutex<Vec<Patch>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let decoder = StreamDecoder::new(
        DecoderOptions::new()
            .auto_repair(auto_repair)
            .on_patch(move |patch| sink.lock().push(patch)),
    );
    (decoder, seen)
}

#[test]
fn test_repair_of_dangling_key() {
    let repaired = repair(r#"{"node2": {"id": "2", "status""#).unwrap();
    let value: Value = serde_json::from_str(&repaired).unwrap();
    assert_eq!(value, json!({"node2": {"id": "2", "status": null}}));
}

#[test]
fn test_repair_closes_strings_literals_and_containers() {
    let cases = [
        (r#"{"a": "hel"#, json!({"a": "hel"})),
        (r#"{"a": tr"#, json!({"a": true})),
        (r#"{"a": [1, 2,"#, json!({"a": [1, 2, null]})),
        (r#"{"a": 1,"#, json!({"a": 1})),
        (r#"{"a":"#, json!({"a": null})),
    ];
    for (tail, expected) in cases {
        let repaired = repair(tail).unwrap_or_else(|| panic!("no repair for {tail}"));
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value, expected, "tail: {tail}");
    }
}

#[test]
fn test_garbage_then_object_emits_only_object() {
    let (mut decoder, seen) = collecting(false);
    decoder.write("Here is your UI: }} ]] nonsense ");
    decoder.write(r#"{"hero": {"type": "Banner"}} and a farewell"#);
    decoder.end();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, "hero");
    assert_eq!(seen[0].data["type"], json!("Banner"));
}

#[test]
fn test_malformed_value_is_dropped_and_decoder_resyncs() {
    let (mut decoder, seen) = collecting(false);
    decoder.write(r#"{"a": {oops}} {"b": {"type": "Box"}}"#);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, "b");
    assert_eq!(decoder.stats().parse_errors, 1);
}

#[test]
fn test_character_by_character_feed_matches_single_write() {
    let text = r#"[{"id": "a", "type": "Box", "props": {"label": "x{y}\"z"}}, {"id": "b", "parent": "a"}]"#;

    let (mut whole, whole_seen) = collecting(false);
    whole.write(text);

    let (mut split, split_seen) = collecting(false);
    for ch in text.chars() {
        split.write(&ch.to_string());
    }

    let whole_seen: Vec<Value> = whole_seen.lock().iter().map(Patch::to_value).collect();
    let split_seen: Vec<Value> = split_seen.lock().iter().map(Patch::to_value).collect();
    assert_eq!(whole_seen.len(), 2);
    assert_eq!(whole_seen, split_seen);
}

#[test]
fn test_previews_precede_final_for_each_id() {
    let (mut decoder, seen) = collecting(true);
    for chunk in [
        r#"{"card": {"id": "card", "type": "Ca"#,
        r#"rd", "props": {"ti"#,
        r#"tle": "Hi"}}}"#,
    ] {
        decoder.write(chunk);
    }

    let seen = seen.lock();
    let last = seen.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.data["props"], json!({"title": "Hi"}));
    assert!(seen[..seen.len() - 1].iter().all(|p| !p.is_final));
    assert_eq!(seen.iter().filter(|p| p.is_final).count(), 1);
    assert_eq!(seen[0].data["type"], json!("Ca"));
}

#[test]
fn test_end_reports_last_payload() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = finished.clone();
    let mut decoder = StreamDecoder::new(
        DecoderOptions::new()
            .auto_repair(false)
            .on_finish(move |payload| sink.lock().push(payload.cloned())),
    );
    decoder.write(r#"{"a": {}} {"b": {}}"#);
    let payload = decoder.end();

    assert_eq!(payload, Some(json!({"b": {}})));
    assert_eq!(*finished.lock(), vec![Some(json!({"b": {}}))]);
}

#[test]
fn test_sse_stream_into_atom_registry() {
    let atoms = AtomRegistry::new();
    let mut decoder = StreamDecoder::new(
        DecoderOptions::new()
            .auto_repair(false)
            .transform(SseTransform::new())
            .into_atoms(atoms.clone()),
    );
    decoder.write("event: patch\ndata: [{\"id\": \"profile\", ");
    decoder.write("\"name\": \"Ada\"}]\n\n");
    decoder.write("data: [DONE]\n");
    decoder.end();

    assert_eq!(
        atoms.get("profile"),
        Some(json!({"id": "profile", "name": "Ada"}))
    );
}

#[test]
fn test_runtime_stream_creates_no_node_under_the_entry_key() {
    let runtime = Runtime::new(&TesseraConfig::default());
    let mut stream = runtime.stream();
    stream.write(r#"{"card": {"type": "Card", "#);
    stream.write(r#""id": "c1"}}"#);
    stream.end();
    runtime.flush();

    let ids: Vec<String> = runtime.entities().ids().cloned().collect();
    assert_eq!(ids, vec!["c1".to_string()]);
    let roots: Vec<String> = runtime.tree().iter().map(|n| n.read().id.clone()).collect();
    assert_eq!(roots, vec!["c1".to_string()]);
}
