//! Integration tests for the depth ceiling and its error marker

use super::test_utils::chain;
use tessera::node::RECURSION_DEPTH_EXCEEDED;
use tessera::{CompileOptions, Compiler, NodeRef};

fn depth_of(root: &NodeRef) -> usize {
    let children = root.read().children.clone();
    1 + children.iter().map(depth_of).max().unwrap_or(0)
}

#[test]
fn test_chain_of_35_is_cut_at_32_with_single_marker() {
    let store = chain(35);
    let mut compiler = Compiler::new();
    let roots = compiler.compile(&store, &CompileOptions::default()).unwrap();

    assert_eq!(depth_of(&roots[0]), 32);
    let marked: Vec<String> = (0..35)
        .filter_map(|i| compiler.node(&format!("n{i}")))
        .filter(|node| node.read().error_marker() == Some(RECURSION_DEPTH_EXCEEDED))
        .map(|node| node.read().id.clone())
        .collect();
    assert_eq!(marked, vec!["n31"]);
}

#[test]
fn test_configured_ceiling_is_respected() {
    let store = chain(10);
    let mut compiler = Compiler::new();
    let roots = compiler
        .compile(&store, &CompileOptions::default().with_max_depth(4))
        .unwrap();

    assert_eq!(depth_of(&roots[0]), 4);
    let n3 = compiler.node("n3").unwrap();
    assert!(n3.read().children.is_empty());
    assert!(n3.read().slots.is_empty());
}

#[test]
fn test_tree_above_ceiling_carries_no_marker() {
    let store = chain(31);
    let mut compiler = Compiler::new();
    let roots = compiler.compile(&store, &CompileOptions::default()).unwrap();

    assert_eq!(depth_of(&roots[0]), 31);
    for i in 0..31 {
        let node = compiler.node(&format!("n{i}")).unwrap();
        assert_eq!(node.read().error_marker(), None, "n{i} should be unmarked");
    }
}
