//! Flat per-operator metrics

use super::tree::{NodeId, OperatorTree};
use serde::Serialize;

/// One operator of a plan projected into a flat row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanMetricsRow {
    /// Operator id within the decoded tree
    pub node_id: NodeId,
    /// Parent operator id (None for a root)
    pub parent_id: Option<NodeId>,
    /// Nesting depth (0 for a root)
    pub depth: usize,
    /// Physical operator name
    pub operation: String,
    /// Logical operator name
    pub logical_operation: String,
    /// Estimated total subtree cost
    pub estimated_cost: f64,
    /// Estimated row count
    pub estimated_rows: f64,
    /// Estimated I/O cost
    pub estimated_io: f64,
    /// Estimated CPU cost
    pub estimated_cpu: f64,
    /// Parallel subtree cost
    pub parallel_cost: Option<f64>,
    /// Missing statistics marker
    pub missing_stats: Option<String>,
}

/// Flattens a tree into one row per operator, in depth-first pre-order
pub fn flatten(tree: &OperatorTree) -> Vec<PlanMetricsRow> {
    let mut rows = Vec::with_capacity(tree.len());
    // Depth of each visited node, indexed by arena id.
    let mut depths = vec![0usize; tree.len()];

    for (id, node) in tree.iter_depth_first() {
        let depth = node
            .parent
            .and_then(|p| depths.get(p.index()))
            .map_or(0, |d| d + 1);
        if let Some(slot) = depths.get_mut(id.index()) {
            *slot = depth;
        }

        rows.push(PlanMetricsRow {
            node_id: id,
            parent_id: node.parent,
            depth,
            operation: node.physical_op.clone(),
            logical_operation: node.logical_op.clone(),
            estimated_cost: node.estimated_cost,
            estimated_rows: node.estimated_rows,
            estimated_io: node.estimated_io,
            estimated_cpu: node.estimated_cpu,
            parallel_cost: node.parallel_cost,
            missing_stats: node.missing_stats.clone(),
        });
    }

    rows
}
