//! The node arena and the evaluation driver.

use core::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};

use crate::errors::{GraphError, Result};
use crate::evaluation::Evaluation;
use crate::function::FunctionRef;
use crate::matrix::DMatrix;
use crate::mode::Mode;
use crate::node::{Constant, Node, Symbol};

static NEXT_GRAPH: AtomicUsize = AtomicUsize::new(0);

/// Stable index of a node inside the [`Graph`] that created it. Ids of one
/// graph are rejected by every other graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    graph: usize,
    index: usize,
}

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// An arena of nodes. A node's operands are always added before it, so
/// insertion order is a topological order of the graph.
#[derive(Debug)]
pub struct Graph {
    tag: usize,
    book: Vec<Node>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            tag: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            book: Vec::new(),
        }
    }

    #[inline]
    fn id_at(&self, index: usize) -> NodeId {
        NodeId {
            graph: self.tag,
            index,
        }
    }

    fn slot(&self, id: NodeId) -> Result<usize> {
        if id.graph != self.tag || id.index >= self.book.len() {
            return Err(GraphError::NodeNotFound(id.index));
        }
        Ok(id.index)
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        debug_assert!(node.operands().iter().all(|&d| self.slot(d).is_ok()));
        self.book.push(node);
        self.id_at(self.book.len() - 1)
    }

    /// Adds a free input of shape `rows x cols`.
    pub fn symbol(&mut self, name: impl Into<String>, rows: usize, cols: usize) -> NodeId {
        let op = Rc::new(Symbol { name: name.into() });
        self.push(Node::new(Vec::new(), rows, cols, op))
    }

    /// Adds a constant holding `value`.
    pub fn constant(&mut self, value: DMatrix) -> NodeId {
        let (rows, cols) = value.shape();
        let mut node = Node::new(Vec::new(), rows, cols, Rc::new(Constant));
        *node.value_mut() = value;
        self.push(node)
    }

    /// Adds a node evaluating output `output` of `function` on `operands`.
    pub fn evaluation(
        &mut self,
        function: FunctionRef,
        operands: &[NodeId],
        output: usize,
    ) -> Result<NodeId> {
        Evaluation::create(self, function, operands, output)
    }

    /// Adds one evaluation node per output of `function`, all sharing it.
    pub fn call(&mut self, function: FunctionRef, operands: &[NodeId]) -> Result<Vec<NodeId>> {
        let n_out = function
            .try_borrow()
            .map_err(|_| GraphError::FunctionBusy)?
            .output_count();
        (0..n_out)
            .map(|j| Evaluation::create(self, Rc::clone(&function), operands, j))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.book.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.book.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        let i = self.slot(id)?;
        Ok(&self.book[i])
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        let i = self.slot(id)?;
        Ok(&mut self.book[i])
    }

    pub fn value(&self, id: NodeId) -> Result<&DMatrix> {
        Ok(self.node(id)?.value())
    }

    pub fn sensitivity(&self, id: NodeId) -> Result<&DMatrix> {
        Ok(self.node(id)?.sensitivity())
    }

    /// Overwrites the primal value of a node.
    pub fn set_value(&mut self, id: NodeId, data: &[f64]) -> Result<()> {
        self.node_mut(id)?.value_mut().assign(data)
    }

    /// Overwrites the order-1 value of a node: a tangent seed before a
    /// forward pass, an adjoint seed before a reverse pass.
    pub fn set_sensitivity(&mut self, id: NodeId, data: &[f64]) -> Result<()> {
        self.node_mut(id)?.sensitivity_mut().assign(data)
    }

    pub fn reset_sensitivities(&mut self) {
        for node in &mut self.book {
            node.sensitivity_mut().fill_zero();
        }
    }

    /// Evaluates a single node. Its operands must be current for `mode`.
    pub fn evaluate_node(&mut self, id: NodeId, mode: Mode) -> Result<()> {
        let op = Rc::clone(self.node(id)?.operation());
        trace!("visiting node {} in {} mode", id, mode);
        op.evaluate(self, id, mode)
    }

    /// Evaluates a single node from a `(forward order, adjoint order)` pair.
    /// An invalid pair is rejected before any state is touched.
    pub fn evaluate_node_orders(&mut self, id: NodeId, forward: u8, adjoint: u8) -> Result<()> {
        let mode = Mode::from_orders(forward, adjoint)?;
        self.evaluate_node(id, mode)
    }

    /// Runs a full pass over the graph.
    ///
    /// Primal and forward passes visit nodes in topological order. An
    /// adjoint pass visits them in reverse, so every consumer of a node has
    /// added its contribution before the node propagates further; adjoint
    /// seeds must already be set and primal values current.
    pub fn evaluate(&mut self, mode: Mode) -> Result<()> {
        debug!("{} pass over {} nodes", mode, self.book.len());
        match mode {
            Mode::Primal | Mode::Forward => self.sweep(0..self.book.len(), mode),
            Mode::Adjoint => self.sweep((0..self.book.len()).rev(), mode),
        }
    }

    /// Reverse pass from `root`: clears all sensitivities, seeds `root` with
    /// ones and propagates down to the first node. Primal values must be current.
    pub fn backward(&mut self, root: NodeId) -> Result<()> {
        let n = self.node(root)?.value().numel();
        self.reset_sensitivities();
        self.set_sensitivity(root, &vec![1.0; n])?;
        debug!("backward pass from node {}", root);
        self.sweep((0..=root.index).rev(), Mode::Adjoint)
    }

    fn sweep(&mut self, order: impl Iterator<Item = usize>, mode: Mode) -> Result<()> {
        for i in order {
            self.evaluate_node(self.id_at(i), mode)?;
        }
        Ok(())
    }

    /// Returns a printable view of node `id` and everything it depends on.
    pub fn display(&self, id: NodeId) -> Result<DisplayNode<'_>> {
        self.node(id)?;
        Ok(DisplayNode { graph: self, id })
    }
}

/// Prints a node as its operation applied to its printed operands.
#[derive(Clone, Copy)]
pub struct DisplayNode<'a> {
    graph: &'a Graph,
    id: NodeId,
}

impl fmt::Display for DisplayNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.graph.book[self.id.index];
        let operands: Vec<DisplayNode<'_>> = node
            .operands()
            .iter()
            .map(|&id| DisplayNode {
                graph: self.graph,
                id,
            })
            .collect();
        node.operation().print(f, node, &operands)
    }
}
