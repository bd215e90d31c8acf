//! Graph node definitions and the leaf node kinds.

use core::fmt;
use std::rc::Rc;

use crate::errors::Result;
use crate::graph::{DisplayNode, Graph, NodeId};
use crate::matrix::DMatrix;
use crate::mode::Mode;

/// The behaviour of a node kind: how it evaluates and how it prints.
pub trait Operation: fmt::Debug {
    /// Evaluates node `id` of `graph` in `mode`. Operands are already
    /// evaluated for primal and forward passes; for adjoint passes every
    /// consumer of `id` has already added its contribution to the node's
    /// sensitivity.
    fn evaluate(&self, graph: &mut Graph, id: NodeId, mode: Mode) -> Result<()>;

    /// Writes the textual form of `node` given its printed operands.
    fn print(
        &self,
        f: &mut fmt::Formatter<'_>,
        node: &Node,
        operands: &[DisplayNode<'_>],
    ) -> fmt::Result;
}

/// A node of the expression graph, with its operands and its value at each
/// sensitivity order.
#[derive(Clone, Debug)]
pub struct Node {
    operands: Vec<NodeId>,
    /// `values[0]` is the primal value, `values[1]` the tangent or adjoint.
    values: [DMatrix; 2],
    op: Rc<dyn Operation>,
}

impl Node {
    /// Creates a node with zero-filled values of shape `rows x cols`.
    pub fn new(operands: Vec<NodeId>, rows: usize, cols: usize, op: Rc<dyn Operation>) -> Self {
        Self {
            operands,
            values: [DMatrix::zeros(rows, cols), DMatrix::zeros(rows, cols)],
            op,
        }
    }

    #[inline]
    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.values[0].shape()
    }

    #[inline]
    pub fn value(&self) -> &DMatrix {
        &self.values[0]
    }

    /// The order-1 value: a tangent after a forward pass, an adjoint during
    /// and after a reverse pass.
    #[inline]
    pub fn sensitivity(&self) -> &DMatrix {
        &self.values[1]
    }

    #[inline]
    pub fn operation(&self) -> &Rc<dyn Operation> {
        &self.op
    }

    pub(crate) fn value_mut(&mut self) -> &mut DMatrix {
        &mut self.values[0]
    }

    pub(crate) fn sensitivity_mut(&mut self) -> &mut DMatrix {
        &mut self.values[1]
    }
}

/// A free input of the graph. Its values are set from outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
}

impl Operation for Symbol {
    fn evaluate(&self, _: &mut Graph, _: NodeId, _: Mode) -> Result<()> {
        Ok(())
    }

    fn print(&self, f: &mut fmt::Formatter<'_>, _: &Node, _: &[DisplayNode<'_>]) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A fixed value. Its tangent is always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Constant;

impl Operation for Constant {
    fn evaluate(&self, graph: &mut Graph, id: NodeId, mode: Mode) -> Result<()> {
        if mode == Mode::Forward {
            graph.node_mut(id)?.sensitivity_mut().fill_zero();
        }
        Ok(())
    }

    fn print(&self, f: &mut fmt::Formatter<'_>, node: &Node, _: &[DisplayNode<'_>]) -> fmt::Result {
        write!(f, "{}", node.value())
    }
}
