//! Plan findings - textual diagnostics derived from plan metrics

use crate::showplan::PlanMetricsRow;
use serde::Serialize;

/// Cost above which an operator is reported as expensive
pub const EXPENSIVE_COST_THRESHOLD: f64 = 1.0;

/// Estimated row count above which a plan is reported as processing many rows
pub const LARGE_ROW_THRESHOLD: f64 = 10_000.0;

/// Kind of a plan finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// No metrics were available
    Unanalyzable,
    /// A single operator above the cost threshold
    ExpensiveOperation,
    /// At least one operator lacks column statistics
    MissingStatistics,
    /// The plan runs in parallel
    ParallelExecution,
    /// At least one operator estimates a large row count
    LargeRowEstimate,
}

/// A textual diagnostic about a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Classifies flattened plan metrics into findings
///
/// Checks run in a fixed order: expensive operators (one finding each, in
/// row order), missing statistics, parallelism, large row estimates. An
/// empty input yields a single "unable to analyze" finding.
pub fn classify(rows: &[PlanMetricsRow]) -> Vec<Finding> {
    if rows.is_empty() {
        return vec![Finding::new(
            FindingKind::Unanalyzable,
            "Unable to analyze execution plan metrics",
        )];
    }

    let mut findings: Vec<Finding> = rows
        .iter()
        .filter(|row| row.estimated_cost > EXPENSIVE_COST_THRESHOLD)
        .map(|row| {
            Finding::new(
                FindingKind::ExpensiveOperation,
                format!(
                    "Expensive operation found: {} (Cost: {:.2})",
                    row.operation, row.estimated_cost
                ),
            )
        })
        .collect();

    if rows.iter().any(|row| row.missing_stats.is_some()) {
        findings.push(Finding::new(
            FindingKind::MissingStatistics,
            "Missing statistics detected - consider updating statistics",
        ));
    }

    if rows
        .iter()
        .any(|row| row.parallel_cost.is_some_and(|cost| cost > 0.0))
    {
        findings.push(Finding::new(
            FindingKind::ParallelExecution,
            "Query uses parallel execution - consider reviewing parallelism threshold",
        ));
    }

    if rows
        .iter()
        .any(|row| row.estimated_rows > LARGE_ROW_THRESHOLD)
    {
        findings.push(Finding::new(
            FindingKind::LargeRowEstimate,
            "Large number of rows being processed - consider adding indexes or optimizing joins",
        ));
    }

    findings
}

#[cfg(test)]
mod tests;
