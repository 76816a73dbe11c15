//! Tests for plan findings

use super::*;
use crate::showplan::NodeId;
use pretty_assertions::assert_eq;

fn row(operation: &str, cost: f64, rows: f64) -> PlanMetricsRow {
    PlanMetricsRow {
        node_id: NodeId(0),
        parent_id: None,
        depth: 0,
        operation: operation.to_string(),
        logical_operation: String::new(),
        estimated_cost: cost,
        estimated_rows: rows,
        estimated_io: 0.0,
        estimated_cpu: 0.0,
        parallel_cost: None,
        missing_stats: None,
    }
}

fn messages(findings: &[Finding]) -> Vec<String> {
    findings.iter().map(|f| f.to_string()).collect()
}

#[test]
fn test_classify_empty_metrics() {
    let findings = classify(&[]);

    assert_eq!(
        messages(&findings),
        vec!["Unable to analyze execution plan metrics".to_string()]
    );
    assert_eq!(findings[0].kind, FindingKind::Unanalyzable);
}

#[test]
fn test_classify_expensive_operation_message() {
    let findings = classify(&[row("Hash Match", 15.0, 10.0)]);

    assert_eq!(
        messages(&findings),
        vec!["Expensive operation found: Hash Match (Cost: 15.00)".to_string()]
    );
}

#[test]
fn test_classify_cheap_plan_has_no_findings() {
    let findings = classify(&[row("Index Seek", 0.0032, 1.0), row("Key Lookup", 1.0, 1.0)]);
    assert!(findings.is_empty());
}

#[test]
fn test_classify_reports_every_expensive_row_in_order() {
    let findings = classify(&[
        row("Hash Match", 15.0, 10.0),
        row("Index Seek", 0.5, 10.0),
        row("Sort", 2.346, 10.0),
        row("Sort", 2.346, 10.0),
    ]);

    assert_eq!(
        messages(&findings),
        vec![
            "Expensive operation found: Hash Match (Cost: 15.00)".to_string(),
            "Expensive operation found: Sort (Cost: 2.35)".to_string(),
            "Expensive operation found: Sort (Cost: 2.35)".to_string(),
        ]
    );
}

#[test]
fn test_classify_summary_checks_run_in_fixed_order() {
    let mut stats = row("Filter", 0.2, 5.0);
    stats.missing_stats = Some("Region".into());
    let mut parallel = row("Parallelism", 0.3, 5.0);
    parallel.parallel_cost = Some(0.3);
    let mut second_stats = row("Filter", 0.2, 5.0);
    second_stats.missing_stats = Some("Amount".into());

    let findings = classify(&[
        row("Clustered Index Scan", 3.0, 50_000.0),
        stats,
        parallel,
        second_stats,
    ]);

    let kinds: Vec<FindingKind> = findings.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FindingKind::ExpensiveOperation,
            FindingKind::MissingStatistics,
            FindingKind::ParallelExecution,
            FindingKind::LargeRowEstimate,
        ]
    );
    assert_eq!(
        findings[1].message,
        "Missing statistics detected - consider updating statistics"
    );
    assert_eq!(
        findings[2].message,
        "Query uses parallel execution - consider reviewing parallelism threshold"
    );
    assert_eq!(
        findings[3].message,
        "Large number of rows being processed - consider adding indexes or optimizing joins"
    );
}

#[test]
fn test_classify_zero_parallel_cost_and_row_boundary() {
    let mut serial = row("Stream Aggregate", 0.1, 10_000.0);
    serial.parallel_cost = Some(0.0);

    assert!(classify(&[serial]).is_empty());
}

#[test]
fn test_classify_is_deterministic() {
    let rows = vec![row("Hash Match", 15.0, 20_000.0), row("Sort", 1.5, 10.0)];
    assert_eq!(classify(&rows), classify(&rows));
}
