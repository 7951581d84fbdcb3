//! Property-based tests for determinism guarantees

use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tessera::node::snapshot_tree;
use tessera::{
    flatten, same_node, unflatten, CompileOptions, Compiler, DecoderOptions, Entity, EntityStore,
    Patch, StreamDecoder,
};

const TYPES: [&str; 4] = ["Box", "Text", "Button", "Card"];

/// Forest of `types.len()` nodes; each parent pick refers to an earlier node or none
fn forest(types: &[usize], parents: &[Option<usize>]) -> EntityStore {
    let mut store = EntityStore::new();
    for (i, type_index) in types.iter().enumerate() {
        let mut entity = Entity::new(format!("n{i}"), TYPES[*type_index % TYPES.len()])
            .with_prop("index", json!(i));
        if let Some(Some(pick)) = parents.get(i) {
            if i > 0 {
                entity = entity.with_parent(format!("n{}", pick % i));
            }
        }
        store.insert(entity);
    }
    store
}

fn forest_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<Option<usize>>)> {
    (1usize..20).prop_flat_map(|len| {
        (
            prop::collection::vec(0usize..TYPES.len(), len),
            prop::collection::vec(prop::option::of(0usize..64), len),
        )
    })
}

/// Two fresh compilers agree on the same input
#[test]
fn test_compile_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&forest_strategy(), |(types, parents)| {
            let store = forest(&types, &parents);
            let first = Compiler::new()
                .compile(&store, &CompileOptions::default())
                .unwrap();
            let second = Compiler::new()
                .compile(&store, &CompileOptions::default())
                .unwrap();

            prop_assert_eq!(snapshot_tree(&first), snapshot_tree(&second));
            Ok(())
        })
        .unwrap();
}

/// An empty dirty set hands back the cached roots
#[test]
fn test_empty_dirty_set_preserves_identity_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&forest_strategy(), |(types, parents)| {
            let store = forest(&types, &parents);
            let mut compiler = Compiler::new();
            let first = compiler.compile(&store, &CompileOptions::default()).unwrap();
            let second = compiler
                .compile(&store, &CompileOptions::default().with_dirty(Vec::<String>::new()))
                .unwrap();

            prop_assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(second.iter()) {
                prop_assert!(same_node(a, b));
            }
            Ok(())
        })
        .unwrap();
}

/// Changing one node's props and recompiling it alone matches a full compile
#[test]
fn test_incremental_matches_full_compile_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(forest_strategy(), any::<prop::sample::Index>()), |((types, parents), pick)| {
            let mut store = forest(&types, &parents);
            let mut compiler = Compiler::new();
            compiler.compile(&store, &CompileOptions::default()).unwrap();

            let id = format!("n{}", pick.index(types.len()));
            let mut changed = store.get(&id).cloned().unwrap();
            changed.props.insert("label".to_string(), json!("changed"));
            store.insert(changed);

            let incremental = compiler
                .compile(&store, &CompileOptions::default().with_dirty([id.clone()]))
                .unwrap();
            let full = Compiler::new()
                .compile(&store, &CompileOptions::default())
                .unwrap();

            prop_assert_eq!(snapshot_tree(&incremental), snapshot_tree(&full));
            Ok(())
        })
        .unwrap();
}

/// Flattening a recompiled flat map changes nothing structural
#[test]
fn test_flatten_idempotence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&forest_strategy(), |(types, parents)| {
            let store = forest(&types, &parents);
            let roots = unflatten(&store).unwrap();
            let once = flatten(&roots);
            let twice = flatten(&unflatten(&once).unwrap());

            prop_assert_eq!(once.len(), twice.len());
            for entity in once.iter() {
                let other = twice.get(&entity.id).unwrap();
                prop_assert_eq!(&entity.node_type, &other.node_type);
                prop_assert_eq!(&entity.parent, &other.parent);
            }
            Ok(())
        })
        .unwrap();
}

fn decode_finals(chunks: &[&str]) -> Vec<Patch> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut decoder = StreamDecoder::new(DecoderOptions::new().on_patch(move |patch| {
        if patch.is_final {
            sink.lock().push(patch);
        }
    }));
    for chunk in chunks {
        decoder.write(chunk);
    }
    decoder.end();
    let finals = seen.lock().clone();
    finals
}

/// Where the text is split never changes the final patches
#[test]
fn test_decoder_chunk_split_invariance_property() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let strategy = (forest_strategy(), prop::collection::vec(any::<prop::sample::Index>(), 0..8));

    runner
        .run(&strategy, |((types, parents), cuts)| {
            let store = forest(&types, &parents);
            let text: String = store
                .iter()
                .map(|entity| {
                    let mut object = serde_json::Map::new();
                    object.insert(entity.id.clone(), serde_json::to_value(entity).unwrap());
                    serde_json::Value::Object(object).to_string()
                })
                .collect::<Vec<_>>()
                .join("\n");

            let mut offsets: Vec<usize> = cuts.iter().map(|cut| cut.index(text.len() + 1)).collect();
            offsets.sort_unstable();
            offsets.dedup();
            let mut chunks = Vec::new();
            let mut start = 0;
            for offset in offsets {
                chunks.push(&text[start..offset]);
                start = offset;
            }
            chunks.push(&text[start..]);

            let whole = decode_finals(&[text.as_str()]);
            let split = decode_finals(&chunks);
            prop_assert_eq!(whole.len(), store.len());
            prop_assert_eq!(whole, split);
            Ok(())
        })
        .unwrap();
}
