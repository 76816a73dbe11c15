//! Operator tree - arena representation of a decoded execution plan
//!
//! Nodes live in a single `Vec` and refer to each other by [`NodeId`].
//! Every node has at most one parent and owns the ordered list of its
//! children's ids, so the structure is a forest without cycles.

use serde::Serialize;

/// Index of a node inside an [`OperatorTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One relational operator of an execution plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorNode {
    /// Physical operator name (e.g. "Hash Match")
    pub physical_op: String,
    /// Logical operator name (e.g. "Inner Join")
    pub logical_op: String,
    /// Estimated total subtree cost
    pub estimated_cost: f64,
    /// Estimated row count; fractional because it is a statistical estimate
    pub estimated_rows: f64,
    /// Estimated I/O cost
    pub estimated_io: f64,
    /// Estimated CPU cost
    pub estimated_cpu: f64,
    /// Parallel subtree cost, when the plan reports one
    pub parallel_cost: Option<f64>,
    /// Columns the optimizer found without statistics
    pub missing_stats: Option<String>,
    /// Parent node (None for a root)
    pub parent: Option<NodeId>,
    /// Child nodes in document order
    pub children: Vec<NodeId>,
}

impl OperatorNode {
    /// Creates a node for the given physical operator with zero costs
    pub fn new(physical_op: impl Into<String>) -> Self {
        Self {
            physical_op: physical_op.into(),
            logical_op: String::new(),
            estimated_cost: 0.0,
            estimated_rows: 0.0,
            estimated_io: 0.0,
            estimated_cpu: 0.0,
            parallel_cost: None,
            missing_stats: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Sets the logical operator name
    pub fn with_logical_op(mut self, logical_op: impl Into<String>) -> Self {
        self.logical_op = logical_op.into();
        self
    }

    /// Sets the estimated subtree cost
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = cost;
        self
    }

    /// Sets the estimated row count
    pub fn with_rows(mut self, rows: f64) -> Self {
        self.estimated_rows = rows;
        self
    }

    /// Sets the estimated I/O and CPU costs
    pub fn with_io_cpu(mut self, io: f64, cpu: f64) -> Self {
        self.estimated_io = io;
        self.estimated_cpu = cpu;
        self
    }

    /// Sets the parallel subtree cost
    pub fn with_parallel_cost(mut self, cost: f64) -> Self {
        self.parallel_cost = Some(cost);
        self
    }

    /// Sets the missing statistics marker
    pub fn with_missing_stats(mut self, marker: impl Into<String>) -> Self {
        self.missing_stats = Some(marker.into());
        self
    }
}

/// Arena-backed forest of plan operators
///
/// A showplan may describe several statements, each with its own root
/// operator, so the tree keeps an ordered list of roots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperatorTree {
    nodes: Vec<OperatorNode>,
    roots: Vec<NodeId>,
}

impl OperatorTree {
    /// Creates an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` under `parent` (or as a new root) and returns its id
    ///
    /// Children are kept in insertion order. Any parent/children links
    /// already set on `node` are replaced; a `parent` that is not in this
    /// tree makes the node a root.
    pub fn push(&mut self, mut node: OperatorNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.children.clear();
        match parent.and_then(|p| self.nodes.get_mut(p.0).map(|n| (p, n))) {
            Some((parent_id, parent_node)) => {
                parent_node.children.push(id);
                node.parent = Some(parent_id);
            }
            None => {
                self.roots.push(id);
                node.parent = None;
            }
        }
        self.nodes.push(node);
        id
    }

    /// Returns the node with the given id
    pub fn get(&self, id: NodeId) -> Option<&OperatorNode> {
        self.nodes.get(id.0)
    }

    /// Root operators in document order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// First root, if any
    pub fn root(&self) -> Option<&OperatorNode> {
        self.roots.first().and_then(|id| self.get(*id))
    }

    /// Number of operators in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no operators
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all operators depth-first, parents before children
    pub fn iter_depth_first(&self) -> DepthFirst<'_> {
        DepthFirst::new(self)
    }
}

/// Pre-order iterator over an [`OperatorTree`]
pub struct DepthFirst<'a> {
    tree: &'a OperatorTree,
    stack: Vec<NodeId>,
}

impl<'a> DepthFirst<'a> {
    fn new(tree: &'a OperatorTree) -> Self {
        Self {
            tree,
            stack: tree.roots.iter().rev().copied().collect(),
        }
    }
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = (NodeId, &'a OperatorNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.get(id)?;
        self.stack.extend(node.children.iter().rev().copied());
        Some((id, node))
    }
}
