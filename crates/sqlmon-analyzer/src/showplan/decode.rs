//! Showplan XML decoder
//!
//! Reads the XML produced by `SET SHOWPLAN_XML ON` (or stored in
//! `sys.dm_exec_query_plan`) and builds an [`OperatorTree`] with one node per
//! `RelOp` element. `RelOp` elements may sit at any depth below their parent
//! operator (inside `Hash`, `NestedLoops`, `ComputeScalar` and so on), so the
//! parent of a node is its nearest enclosing `RelOp`, not its XML parent.
//!
//! # Examples
//!
//! ```
//! use sqlmon_analyzer::showplan::{decode, flatten};
//!
//! let xml = r#"<ShowPlanXML xmlns="http://schemas.microsoft.com/sqlserver/2004/07/showplan">
//!   <RelOp PhysicalOp="Hash Match" LogicalOp="Inner Join" EstimatedTotalSubtreeCost="15.2" EstimateRows="1200">
//!     <Hash>
//!       <RelOp PhysicalOp="Clustered Index Scan" LogicalOp="Clustered Index Scan" EstimatedTotalSubtreeCost="3.1" EstimateRows="50000" />
//!     </Hash>
//!   </RelOp>
//! </ShowPlanXML>"#;
//!
//! let tree = decode(xml).unwrap();
//! assert_eq!(tree.len(), 2);
//! assert_eq!(flatten(&tree)[1].operation, "Clustered Index Scan");
//! ```

use super::tree::{NodeId, OperatorNode, OperatorTree};
use roxmltree::{Document, Node};
use thiserror::Error;

const REL_OP: &str = "RelOp";
const WARNINGS: &str = "Warnings";
const COLUMNS_WITH_NO_STATISTICS: &str = "ColumnsWithNoStatistics";
const COLUMN_REFERENCE: &str = "ColumnReference";

/// Errors that can occur when decoding a showplan document
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("Plan document is empty")]
    Empty,

    #[error("Malformed plan XML: {0}")]
    Malformed(#[from] roxmltree::Error),
}

/// Decodes a showplan XML document into an operator tree
///
/// Operators are numbered in depth-first document order. Numeric
/// attributes that are missing, unparsable or negative decode as `0`.
/// A well-formed document without any `RelOp` yields an empty tree.
pub fn decode(xml: &str) -> Result<OperatorTree, PlanParseError> {
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Err(PlanParseError::Empty);
    }

    let document = Document::parse(trimmed)?;
    let mut tree = OperatorTree::new();

    // Explicit stack keeps deeply nested plans off the call stack.
    let mut stack: Vec<(Node<'_, '_>, Option<NodeId>)> = vec![(document.root_element(), None)];
    while let Some((element, parent)) = stack.pop() {
        let owner = if is_element(&element, REL_OP) {
            Some(tree.push(read_operator(&element), parent))
        } else {
            parent
        };

        let children: Vec<Node<'_, '_>> = element.children().filter(|n| n.is_element()).collect();
        stack.extend(children.into_iter().rev().map(|child| (child, owner)));
    }

    tracing::trace!(operators = tree.len(), "decoded showplan");
    Ok(tree)
}

fn is_element(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn read_operator(rel_op: &Node<'_, '_>) -> OperatorNode {
    OperatorNode {
        physical_op: rel_op
            .attribute("PhysicalOp")
            .unwrap_or("Unknown")
            .to_string(),
        logical_op: rel_op.attribute("LogicalOp").unwrap_or_default().to_string(),
        estimated_cost: non_negative(rel_op.attribute("EstimatedTotalSubtreeCost")).unwrap_or(0.0),
        estimated_rows: non_negative(rel_op.attribute("EstimateRows")).unwrap_or(0.0),
        estimated_io: non_negative(rel_op.attribute("EstimateIO")).unwrap_or(0.0),
        estimated_cpu: non_negative(rel_op.attribute("EstimateCPU")).unwrap_or(0.0),
        parallel_cost: non_negative(rel_op.attribute("ParallelSubtreeCost")),
        missing_stats: missing_statistics(rel_op),
        parent: None,
        children: Vec::new(),
    }
}

fn non_negative(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Reads `Warnings/ColumnsWithNoStatistics` directly under this operator
///
/// Returns the `NoStatistics` attribute when present, otherwise the
/// referenced columns joined with `, `.
fn missing_statistics(rel_op: &Node<'_, '_>) -> Option<String> {
    let no_stats = rel_op
        .children()
        .filter(|n| is_element(n, WARNINGS))
        .flat_map(|warnings| warnings.children())
        .find(|n| is_element(n, COLUMNS_WITH_NO_STATISTICS))?;

    if let Some(marker) = no_stats.attribute("NoStatistics") {
        return Some(marker.to_string());
    }

    let columns: Vec<String> = no_stats
        .children()
        .filter(|n| is_element(n, COLUMN_REFERENCE))
        .filter_map(|column_ref| {
            let column = column_ref.attribute("Column")?;
            Some(match column_ref.attribute("Table") {
                Some(table) => format!("{}.{}", table, column),
                None => column.to_string(),
            })
        })
        .collect();

    if columns.is_empty() {
        Some(COLUMNS_WITH_NO_STATISTICS.to_string())
    } else {
        Some(columns.join(", "))
    }
}

#[cfg(test)]
mod tests;
