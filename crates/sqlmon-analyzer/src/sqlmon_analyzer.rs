//! sqlmon analyzer - execution plan decoding and classification
//!
//! This crate provides functionality for:
//! - Decoding SQL Server showplan XML into an operator tree
//! - Flattening the tree into per-operator metrics rows
//! - Building a directed plan graph with cost tiers (and Graphviz DOT export)
//! - Deriving textual findings from the metrics

mod analysis;
pub mod findings;
pub mod graph;
pub mod showplan;

pub use analysis::PlanAnalysis;
pub use findings::{Finding, FindingKind, classify};
pub use graph::{CostTier, GraphEdge, GraphNode, PlanGraph, build};
pub use showplan::*;
