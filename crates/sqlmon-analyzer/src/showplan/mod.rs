//! Showplan decoding
//!
//! `decode` turns a showplan XML document into an [`OperatorTree`];
//! `flatten` projects that tree into one [`PlanMetricsRow`] per operator.

mod decode;
mod metrics;
mod tree;

pub use decode::{PlanParseError, decode};
pub use metrics::{PlanMetricsRow, flatten};
pub use tree::{DepthFirst, NodeId, OperatorNode, OperatorTree};
