//! End-to-end analysis of one plan document

use crate::findings::{Finding, classify};
use crate::graph::{PlanGraph, build};
use crate::showplan::{PlanMetricsRow, decode, flatten};
use serde::Serialize;

/// Metrics, graph and findings for one execution plan
///
/// A plan that cannot be decoded is reported as unavailable: no metrics,
/// no graph, and the single "unable to analyze" finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanAnalysis {
    /// One row per operator in depth-first order
    pub metrics: Vec<PlanMetricsRow>,
    /// Operator graph, when the plan had at least one operator
    pub graph: Option<PlanGraph>,
    /// Findings derived from `metrics`
    pub findings: Vec<Finding>,
    /// Why the plan could not be decoded, if it could not
    pub parse_error: Option<String>,
}

impl PlanAnalysis {
    /// Decodes and analyzes a showplan XML document
    pub fn from_xml(xml: &str) -> Self {
        match decode(xml) {
            Ok(tree) => {
                let metrics = flatten(&tree);
                let graph = (!tree.is_empty()).then(|| build(&tree));
                let findings = classify(&metrics);
                Self {
                    metrics,
                    graph,
                    findings,
                    parse_error: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "execution plan unavailable");
                Self {
                    parse_error: Some(e.to_string()),
                    ..Self::unavailable()
                }
            }
        }
    }

    /// Analysis for a query that produced no plan
    pub fn unavailable() -> Self {
        Self {
            metrics: Vec::new(),
            graph: None,
            findings: classify(&[]),
            parse_error: None,
        }
    }

    /// Returns true if the plan had at least one operator
    pub fn is_available(&self) -> bool {
        !self.metrics.is_empty()
    }

    /// Highest estimated cost of any operator
    pub fn max_cost(&self) -> f64 {
        self.metrics
            .iter()
            .map(|m| m.estimated_cost)
            .fold(0.0, f64::max)
    }
}
