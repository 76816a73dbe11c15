//! Plan Graph - directed graph view of an operator tree
//!
//! Each operator becomes a graph node whose id derives from its arena index,
//! so identical sub-plans stay distinct. Edges point from parent to child.

use crate::showplan::{NodeId, OperatorTree};
use serde::Serialize;
use std::fmt::Write as _;

/// Presentation tier of an operator's estimated cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    /// Cost above 10
    High,
    /// Cost above 1, up to and including 10
    Medium,
    /// Cost of 1 or less
    Normal,
}

impl CostTier {
    /// Classifies an estimated subtree cost
    pub fn from_cost(cost: f64) -> Self {
        if cost > 10.0 {
            Self::High
        } else if cost > 1.0 {
            Self::Medium
        } else {
            Self::Normal
        }
    }

    /// Returns the tier as a display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Normal => "normal",
        }
    }

    /// Graphviz outline and fill colors, if the tier is highlighted
    pub fn colors(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::High => Some(("red", "#ffcccc")),
            Self::Medium => Some(("orange", "#ffe6cc")),
            Self::Normal => None,
        }
    }
}

/// A node of the plan graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    /// Stable identifier, unique per operator
    pub id: String,
    /// Operator this node was built from
    pub node_id: NodeId,
    /// Three-line label: operator, rows, cost
    pub label: String,
    /// Cost tier used for highlighting
    pub tier: CostTier,
}

/// A parent-to-child edge of the plan graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    /// Parent node id
    pub from: String,
    /// Child node id
    pub to: String,
}

/// Directed graph of plan operators
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanGraph {
    /// Nodes in depth-first order
    pub nodes: Vec<GraphNode>,
    /// Edges in depth-first order of their child
    pub edges: Vec<GraphEdge>,
}

/// Builds the graph for a decoded plan
///
/// Does not modify the tree; repeated calls on the same tree produce equal
/// graphs.
pub fn build(tree: &OperatorTree) -> PlanGraph {
    let mut graph = PlanGraph {
        nodes: Vec::with_capacity(tree.len()),
        edges: Vec::with_capacity(tree.len().saturating_sub(tree.roots().len())),
    };

    for (id, node) in tree.iter_depth_first() {
        let graph_id = graph_node_id(id);
        graph.nodes.push(GraphNode {
            id: graph_id.clone(),
            node_id: id,
            label: format!(
                "{}\nRows: {}\nCost: {}",
                node.physical_op, node.estimated_rows, node.estimated_cost
            ),
            tier: CostTier::from_cost(node.estimated_cost),
        });

        if let Some(parent) = node.parent {
            graph.edges.push(GraphEdge {
                from: graph_node_id(parent),
                to: graph_id,
            });
        }
    }

    graph
}

fn graph_node_id(id: NodeId) -> String {
    format!("op{}", id.index())
}

impl PlanGraph {
    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Renders the graph as Graphviz DOT, top to bottom
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph \"Execution Plan\" {\n    rankdir=TB;\n");

        for node in &self.nodes {
            let _ = write!(dot, "    {} [label=\"{}\"", node.id, escape_dot(&node.label));
            if let Some((color, fill)) = node.tier.colors() {
                let _ = write!(
                    dot,
                    ", color=\"{}\", style=\"filled\", fillcolor=\"{}\"",
                    color, fill
                );
            }
            dot.push_str("];\n");
        }

        for edge in &self.edges {
            let _ = writeln!(dot, "    {} -> {};", edge.from, edge.to);
        }

        dot.push_str("}\n");
        dot
    }
}

fn escape_dot(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for ch in label.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests;
