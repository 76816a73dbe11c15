//! Tests for the plan graph builder

use super::*;
use crate::showplan::OperatorNode;
use pretty_assertions::assert_eq;

fn repeated_subplan_tree() -> OperatorTree {
    // Two identical Index Seek children must stay separate nodes.
    let mut tree = OperatorTree::new();
    let root = tree.push(
        OperatorNode::new("Merge Join").with_cost(15.0).with_rows(200.0),
        None,
    );
    tree.push(
        OperatorNode::new("Index Seek").with_cost(2.5).with_rows(100.0),
        Some(root),
    );
    tree.push(
        OperatorNode::new("Index Seek").with_cost(2.5).with_rows(100.0),
        Some(root),
    );
    tree
}

#[test]
fn test_cost_tier_boundaries() {
    assert_eq!(CostTier::from_cost(10.0), CostTier::Medium);
    assert_eq!(CostTier::from_cost(10.01), CostTier::High);
    assert_eq!(CostTier::from_cost(1.0), CostTier::Normal);
    assert_eq!(CostTier::from_cost(1.01), CostTier::Medium);
    assert_eq!(CostTier::from_cost(0.0), CostTier::Normal);
}

#[test]
fn test_build_one_node_per_operator_and_one_edge_per_link() {
    let graph = build(&repeated_subplan_tree());

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert_ne!(graph.nodes[1].id, graph.nodes[2].id);
    assert_eq!(
        graph.edges,
        vec![
            GraphEdge {
                from: "op0".into(),
                to: "op1".into()
            },
            GraphEdge {
                from: "op0".into(),
                to: "op2".into()
            },
        ]
    );
}

#[test]
fn test_build_labels_and_tiers() {
    let graph = build(&repeated_subplan_tree());
    let root = &graph.nodes[0];

    assert_eq!(root.id, "op0");
    assert_eq!(root.label, "Merge Join\nRows: 200\nCost: 15");
    assert_eq!(root.tier, CostTier::High);
    assert_eq!(graph.nodes[1].id, "op1");
    assert_eq!(graph.nodes[1].tier, CostTier::Medium);
}

#[test]
fn test_build_is_idempotent() {
    let tree = repeated_subplan_tree();
    let before = tree.clone();

    let first = build(&tree);
    let second = build(&tree);

    assert_eq!(first, second);
    assert_eq!(tree, before);
}

#[test]
fn test_build_empty_tree() {
    let graph = build(&OperatorTree::new());
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn test_to_dot_colors_and_escapes() {
    let mut tree = OperatorTree::new();
    let root = tree.push(OperatorNode::new("Hash \"Match\"").with_cost(11.0), None);
    tree.push(OperatorNode::new("Sort").with_cost(5.0), Some(root));
    tree.push(OperatorNode::new("Scan").with_cost(0.5), Some(root));

    let dot = build(&tree).to_dot();

    assert!(dot.starts_with("digraph \"Execution Plan\" {"));
    assert!(dot.contains("rankdir=TB;"));
    assert!(dot.contains(
        r##"op0 [label="Hash \"Match\"\nRows: 0\nCost: 11", color="red", style="filled", fillcolor="#ffcccc"];"##
    ));
    assert!(dot.contains(r##"color="orange", style="filled", fillcolor="#ffe6cc""##));
    assert!(dot.contains(r#"op2 [label="Scan\nRows: 0\nCost: 0.5"];"#));
    assert!(dot.contains("op0 -> op1;"));
    assert!(dot.contains("op0 -> op2;"));
    assert!(dot.trim_end().ends_with('}'));
}
