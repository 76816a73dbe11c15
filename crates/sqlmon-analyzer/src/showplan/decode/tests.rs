//! Tests for the showplan decoder

use super::*;
use crate::showplan::flatten;
use pretty_assertions::assert_eq;

const SHOWPLAN_NS: &str = "http://schemas.microsoft.com/sqlserver/2004/07/showplan";

fn wrap(body: &str) -> String {
    format!(
        r#"<ShowPlanXML xmlns="{SHOWPLAN_NS}" Version="1.564" Build="16.0.1000.6">
  <BatchSequence><Batch><Statements>
    <StmtSimple StatementText="SELECT ..." StatementType="SELECT">
      <QueryPlan DegreeOfParallelism="1">
        {body}
      </QueryPlan>
    </StmtSimple>
  </Statements></Batch></BatchSequence>
</ShowPlanXML>"#
    )
}

/// Hash join over a clustered scan and a nested loop whose inner side
/// sits two wrapper elements deep.
fn nested_plan() -> String {
    wrap(
        r#"<RelOp NodeId="0" PhysicalOp="Hash Match" LogicalOp="Inner Join"
                 EstimateRows="25000" EstimateIO="0" EstimateCPU="1.2"
                 EstimatedTotalSubtreeCost="15.75">
          <Hash>
            <RelOp NodeId="1" PhysicalOp="Clustered Index Scan" LogicalOp="Clustered Index Scan"
                   EstimateRows="50000" EstimateIO="3.5" EstimateCPU="0.05"
                   EstimatedTotalSubtreeCost="3.55" />
            <RelOp NodeId="2" PhysicalOp="Nested Loops" LogicalOp="Inner Join"
                   EstimateRows="10" EstimatedTotalSubtreeCost="0.8">
              <NestedLoops Optimized="false">
                <OuterReferences />
                <RelOp NodeId="3" PhysicalOp="Index Seek" LogicalOp="Index Seek"
                       EstimateRows="1" EstimatedTotalSubtreeCost="0.0032" />
                <RelOp NodeId="4" PhysicalOp="Compute Scalar" LogicalOp="Compute Scalar"
                       EstimateRows="1" EstimatedTotalSubtreeCost="0.0001">
                  <ComputeScalar>
                    <DefinedValues />
                    <RelOp NodeId="5" PhysicalOp="Key Lookup" LogicalOp="Key Lookup"
                           EstimateRows="1" EstimatedTotalSubtreeCost="0.0031" />
                  </ComputeScalar>
                </RelOp>
              </NestedLoops>
            </RelOp>
          </Hash>
        </RelOp>"#,
    )
}

#[test]
fn test_decode_creates_one_node_per_relop_in_document_order() {
    let tree = decode(&nested_plan()).unwrap();
    let rows = flatten(&tree);

    assert_eq!(tree.len(), 6);
    assert_eq!(rows.len(), 6);
    let ops: Vec<&str> = rows.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(
        ops,
        vec![
            "Hash Match",
            "Clustered Index Scan",
            "Nested Loops",
            "Index Seek",
            "Compute Scalar",
            "Key Lookup",
        ]
    );
}

#[test]
fn test_decode_parent_is_nearest_enclosing_relop() {
    let tree = decode(&nested_plan()).unwrap();
    let rows = flatten(&tree);

    let parent_of = |op: &str| {
        let row = rows.iter().find(|r| r.operation == op).unwrap();
        row.parent_id
            .map(|p| tree.get(p).unwrap().physical_op.clone())
    };

    assert_eq!(parent_of("Hash Match"), None);
    assert_eq!(parent_of("Clustered Index Scan"), Some("Hash Match".into()));
    assert_eq!(parent_of("Nested Loops"), Some("Hash Match".into()));
    assert_eq!(parent_of("Index Seek"), Some("Nested Loops".into()));
    assert_eq!(parent_of("Key Lookup"), Some("Compute Scalar".into()));

    let depths: Vec<usize> = rows.iter().map(|r| r.depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 2, 2, 3]);
}

#[test]
fn test_decode_reads_numeric_attributes() {
    let tree = decode(&nested_plan()).unwrap();
    let root = tree.root().unwrap();

    assert_eq!(root.physical_op, "Hash Match");
    assert_eq!(root.logical_op, "Inner Join");
    assert_eq!(root.estimated_cost, 15.75);
    assert_eq!(root.estimated_rows, 25000.0);
    assert_eq!(root.estimated_cpu, 1.2);
    assert_eq!(root.parallel_cost, None);
    assert_eq!(root.missing_stats, None);
}

#[test]
fn test_decode_defaults_missing_or_bad_numbers_to_zero() {
    let xml = wrap(r#"<RelOp PhysicalOp="Table Scan" EstimateRows="abc" EstimateIO="-1" />"#);
    let tree = decode(&xml).unwrap();
    let node = tree.root().unwrap();

    assert_eq!(node.estimated_cost, 0.0);
    assert_eq!(node.estimated_rows, 0.0);
    assert_eq!(node.estimated_io, 0.0);
    assert_eq!(node.estimated_cpu, 0.0);
    assert_eq!(node.logical_op, "");
}

#[test]
fn test_decode_fractional_rows_and_parallel_cost() {
    let xml = wrap(
        r#"<RelOp PhysicalOp="Parallelism" LogicalOp="Gather Streams" Parallel="true"
                 EstimateRows="1234.56" EstimatedTotalSubtreeCost="22.1"
                 ParallelSubtreeCost="4.5" />"#,
    );
    let tree = decode(&xml).unwrap();
    let node = tree.root().unwrap();

    assert_eq!(node.estimated_rows, 1234.56);
    assert_eq!(node.parallel_cost, Some(4.5));
}

#[test]
fn test_decode_missing_statistics_from_column_references() {
    let xml = wrap(
        r#"<RelOp PhysicalOp="Filter" LogicalOp="Filter" EstimatedTotalSubtreeCost="0.5">
          <Warnings>
            <ColumnsWithNoStatistics>
              <ColumnReference Database="[Sales]" Schema="[dbo]" Table="[Orders]" Column="CustomerRef" />
              <ColumnReference Column="Region" />
            </ColumnsWithNoStatistics>
          </Warnings>
          <RelOp PhysicalOp="Table Scan" LogicalOp="Table Scan" EstimatedTotalSubtreeCost="0.4" />
        </RelOp>"#,
    );
    let tree = decode(&xml).unwrap();
    let rows = flatten(&tree);

    assert_eq!(
        rows[0].missing_stats.as_deref(),
        Some("[Orders].CustomerRef, Region")
    );
    // Warnings belong to the operator that owns them, not its children.
    assert_eq!(rows[1].missing_stats, None);
}

#[test]
fn test_decode_missing_statistics_attribute_marker() {
    let xml = wrap(
        r#"<RelOp PhysicalOp="Sort" LogicalOp="Sort">
          <Warnings><ColumnsWithNoStatistics NoStatistics="Amount" /></Warnings>
        </RelOp>"#,
    );
    let tree = decode(&xml).unwrap();

    assert_eq!(tree.root().unwrap().missing_stats.as_deref(), Some("Amount"));
}

#[test]
fn test_decode_without_namespace() {
    let tree = decode(r#"<RelOp PhysicalOp="Constant Scan"><RelOp PhysicalOp="Sort" /></RelOp>"#)
        .unwrap();

    assert_eq!(tree.len(), 2);
}

#[test]
fn test_decode_document_without_operators_is_empty() {
    let tree = decode(&wrap("")).unwrap();

    assert!(tree.is_empty());
    assert!(flatten(&tree).is_empty());
}

#[test]
fn test_decode_malformed_document() {
    let err = decode("<ShowPlanXML><RelOp PhysicalOp=\"Sort\"></ShowPlanXML>").unwrap_err();
    assert!(matches!(err, PlanParseError::Malformed(_)));

    let err = decode("not xml at all").unwrap_err();
    assert!(matches!(err, PlanParseError::Malformed(_)));

    let err = decode("   ").unwrap_err();
    assert!(matches!(err, PlanParseError::Empty));
}
