//! Integration tests for write coalescing in the reactive runtime

use super::test_utils::patch;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tessera::runtime::{Dirty, ManualScheduler, SignalCenter};
use tessera::{Atom, AtomRegistry, AtomStore, Entity, Runtime, SchedulerKind, TesseraConfig};

fn manual_runtime() -> Arc<Runtime> {
    let mut config = TesseraConfig::default();
    config.runtime.scheduler = SchedulerKind::Manual;
    Runtime::new(&config)
}

#[test]
fn test_writes_in_one_tick_flush_once() {
    let runtime = manual_runtime();
    runtime.atoms().set("n", json!(0));
    runtime
        .feed(&patch("label", json!({"type": "Text", "props": {"text": "{{n}}"}})))
        .unwrap();
    runtime.tick();
    assert_eq!(runtime.generation(), 1);

    for i in 1..=5 {
        runtime.atoms().set("n", json!(i));
    }
    assert_eq!(runtime.generation(), 1);
    assert_eq!(runtime.signals().pending_ids().len(), 1);

    assert_eq!(runtime.tick(), 1);
    assert_eq!(runtime.generation(), 2);
    assert_eq!(
        runtime.node("label").unwrap().read().resolved_props["text"],
        json!(5)
    );
}

#[test]
fn test_batch_coalesces_with_immediate_scheduler() {
    let runtime = Runtime::new(&TesseraConfig::default());
    let renders = Arc::new(Mutex::new(0));
    let counter = renders.clone();
    let _sub = runtime.on_render(move |_| *counter.lock() += 1);

    runtime.batch(|| {
        runtime.insert(Entity::new("root", "Page"));
        runtime.batch(|| {
            runtime.insert(Entity::new("a", "Box").with_parent("root"));
            runtime.insert(Entity::new("b", "Box").with_parent("root"));
        });
        runtime.atoms().set("unrelated", json!(true));
    });

    assert_eq!(*renders.lock(), 1);
    assert_eq!(runtime.tree()[0].read().children.len(), 2);
}

#[test]
fn test_removal_prunes_node_from_tree() {
    let runtime = Runtime::new(&TesseraConfig::default());
    runtime
        .feed_all(&[
            patch("root", json!({"type": "Page"})),
            patch("temp", json!({"type": "Toast", "parent": "root"})),
        ])
        .unwrap();
    assert_eq!(runtime.tree()[0].read().children.len(), 1);

    assert!(runtime.remove("temp").is_some());
    assert!(runtime.node("temp").is_none());
    assert!(runtime.tree()[0].read().children.is_empty());
}

#[test]
fn test_smart_update_keeps_atom_identity_and_notifies() {
    let registry = AtomRegistry::new();
    let atom = Atom::new(json!("light"));
    registry.insert_atom("theme", atom.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = atom.subscribe(move |value| sink.lock().push(value.clone()));

    registry.set("theme", json!("dark"));

    let stored = registry.get_atom("theme").unwrap();
    assert!(Arc::ptr_eq(&stored, &atom));
    assert_eq!(atom.get(), json!("dark"));
    assert_eq!(*seen.lock(), vec![json!("dark")]);
}

#[test]
fn test_signal_center_flushes_full_after_ids() {
    let scheduler = ManualScheduler::new();
    let center = SignalCenter::new(scheduler.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    center.set_target(Arc::new(move |dirty| sink.lock().push(dirty)));

    center.mark_dirty(["x"]);
    scheduler.tick();
    center.mark_full();
    scheduler.tick();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(matches!(&seen[0], Dirty::Ids(ids) if ids.contains("x")));
    assert_eq!(seen[1], Dirty::Full);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_scheduler_flushes_off_thread() {
    let mut config = TesseraConfig::default();
    config.runtime.scheduler = SchedulerKind::Tokio;
    let runtime = Runtime::new(&config);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let _sub = runtime.on_render(move |roots| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(roots.len());
        }
    });

    runtime.insert(Entity::new("root", "Page"));
    let roots = tokio::time::timeout(std::time::Duration::from_secs(5), rx)
        .await
        .expect("flush should run")
        .unwrap();
    assert_eq!(roots, 1);
}
