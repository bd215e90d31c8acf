//! Nodes that evaluate one output of a wrapped black-box function.

use core::fmt;
use std::rc::Rc;

use log::{debug, trace};

use crate::errors::{GraphError, Result};
use crate::function::{FunctionRef, Slot};
use crate::graph::{DisplayNode, Graph, NodeId};
use crate::mode::Mode;
use crate::node::{Node, Operation};

/// Output `output` of a wrapped function applied to the node's operands.
///
/// Operand `i` feeds input port `i`. The node shape is the declared shape of
/// the selected output and is fixed at construction.
#[derive(Clone)]
pub struct Evaluation {
    function: FunctionRef,
    output: usize,
}

impl Evaluation {
    /// Adds an evaluation node to `graph`.
    ///
    /// Fails if `output` is not a declared output, if the operand count differs
    /// from the declared input count, or if an operand's element count differs
    /// from its input port's.
    pub fn create(
        graph: &mut Graph,
        function: FunctionRef,
        operands: &[NodeId],
        output: usize,
    ) -> Result<NodeId> {
        let (rows, cols) = {
            let f = function.try_borrow().map_err(|_| GraphError::FunctionBusy)?;
            if output >= f.output_count() {
                return Err(GraphError::out_of_range("output slot", output, f.output_count()));
            }
            if operands.len() != f.input_count() {
                return Err(GraphError::out_of_range(
                    "operand count",
                    operands.len(),
                    f.input_count(),
                ));
            }
            for (i, &dep) in operands.iter().enumerate() {
                let (r, c) = f.input_shape(i)?;
                let (dr, dc) = graph.node(dep)?.shape();
                if r * c != dr * dc {
                    return Err(GraphError::shape(
                        "evaluation operand",
                        format!("{}x{}", r, c),
                        format!("{}x{}", dr, dc),
                    ));
                }
            }
            let shape = f.output_shape(output)?;
            debug!(
                "new evaluation of {} output {} with {} operands ({}x{})",
                &*f,
                output,
                operands.len(),
                shape.0,
                shape.1
            );
            shape
        };
        let op = Rc::new(Evaluation { function, output });
        Ok(graph.push(Node::new(operands.to_vec(), rows, cols, op)))
    }

    pub fn function(&self) -> &FunctionRef {
        &self.function
    }

    pub fn output(&self) -> usize {
        self.output
    }
}

impl Operation for Evaluation {
    fn evaluate(&self, graph: &mut Graph, id: NodeId, mode: Mode) -> Result<()> {
        let mut f = self
            .function
            .try_borrow_mut()
            .map_err(|_| GraphError::FunctionBusy)?;
        let operands = graph.node(id)?.operands().to_vec();
        debug!("evaluating node {} ({} output {}) in {} mode", id, &*f, self.output, mode);

        for (i, &dep) in operands.iter().enumerate() {
            f.set_input(i, Slot::Value, graph.value(dep)?.data())?;
        }
        if mode == Mode::Forward {
            trace!("seeding {} input tangents", operands.len());
            for (i, &dep) in operands.iter().enumerate() {
                f.set_input(i, Slot::Tangent, graph.sensitivity(dep)?.data())?;
            }
        }

        // The reverse sweep is a separate call made once the seed is in place.
        let first = match mode {
            Mode::Forward => Mode::Forward,
            Mode::Primal | Mode::Adjoint => Mode::Primal,
        };
        f.evaluate(first)?;

        let node = graph.node_mut(id)?;
        let out = f.output(self.output, Slot::Value)?;
        if out.shape() != node.shape() {
            let (r, c) = node.shape();
            return Err(GraphError::shape(
                "evaluation output",
                format!("{}x{}", r, c),
                format!("{}x{}", out.rows(), out.cols()),
            ));
        }
        node.value_mut().assign(out.data())?;
        if mode == Mode::Forward {
            node.sensitivity_mut()
                .assign(f.output(self.output, Slot::Tangent)?.data())?;
        }

        if mode == Mode::Adjoint {
            trace!("seeding output {} adjoint", self.output);
            // only the selected output carries a seed into the reverse sweep
            for j in (0..f.output_count()).filter(|&j| j != self.output) {
                let n = f.output(j, Slot::Adjoint)?.numel();
                f.set_output(j, Slot::Adjoint, &vec![0.0; n])?;
            }
            f.set_output(self.output, Slot::Adjoint, graph.sensitivity(id)?.data())?;
            f.evaluate(Mode::Adjoint)?;
            for (i, &dep) in operands.iter().enumerate() {
                graph
                    .node_mut(dep)?
                    .sensitivity_mut()
                    .accumulate(f.input(i, Slot::Adjoint)?.data())?;
            }
        }
        Ok(())
    }

    fn print(
        &self,
        f: &mut fmt::Formatter<'_>,
        _: &Node,
        operands: &[DisplayNode<'_>],
    ) -> fmt::Result {
        match self.function.try_borrow() {
            Ok(func) => write!(f, "{}[", &*func)?,
            Err(_) => write!(f, "<busy>[")?,
        }
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", operand)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Evaluation");
        match self.function.try_borrow() {
            Ok(func) => s.field("function", &func.to_string()),
            Err(_) => s.field("function", &"<busy>"),
        };
        s.field("output", &self.output).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jacobian::JacobianFunction;
    use crate::matrix::DMatrix;
    use std::cell::RefCell;

    fn square() -> FunctionRef {
        Rc::new(RefCell::new(JacobianFunction::new(
            "sq",
            &[(1, 1)],
            &[(1, 1)],
            |a| Ok(vec![vec![a[0][0] * a[0][0]]]),
            |a| Ok(vec![vec![DMatrix::scalar(2.0 * a[0][0])]]),
        )))
    }

    /// `(u, v) -> (u * v, u - v)` on scalars.
    fn prod_diff() -> FunctionRef {
        Rc::new(RefCell::new(JacobianFunction::new(
            "pd",
            &[(1, 1), (1, 1)],
            &[(1, 1), (1, 1)],
            |a| Ok(vec![vec![a[0][0] * a[1][0]], vec![a[0][0] - a[1][0]]]),
            |a| {
                Ok(vec![
                    vec![DMatrix::scalar(a[1][0]), DMatrix::scalar(a[0][0])],
                    vec![DMatrix::scalar(1.0), DMatrix::scalar(-1.0)],
                ])
            },
        )))
    }

    #[test]
    fn construction_checks_output_slot() {
        let mut g = Graph::new();
        let x = g.symbol("x", 1, 1);
        let err = Evaluation::create(&mut g, square(), &[x], 1).unwrap_err();
        assert_eq!(err, GraphError::out_of_range("output slot", 1, 1));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn construction_checks_operand_count() {
        let mut g = Graph::new();
        let x = g.symbol("x", 1, 1);
        let err = Evaluation::create(&mut g, prod_diff(), &[x], 0).unwrap_err();
        assert!(matches!(
            err,
            GraphError::OutOfRange { what: "operand count", index: 1, len: 2 }
        ));
    }

    #[test]
    fn construction_checks_operand_shape() {
        let mut g = Graph::new();
        let x = g.symbol("x", 2, 1);
        let err = Evaluation::create(&mut g, square(), &[x], 0).unwrap_err();
        assert!(matches!(err, GraphError::ShapeMismatch { context: "evaluation operand", .. }));
    }

    #[test]
    fn construction_rejects_unknown_operand() {
        let mut g = Graph::new();
        let mut other = Graph::new();
        other.symbol("a", 1, 1);
        let stray = other.symbol("b", 1, 1);
        let err = Evaluation::create(&mut g, square(), &[stray], 0).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound(1));
    }

    #[test]
    fn construction_rejects_operand_of_another_graph() {
        let mut g = Graph::new();
        g.symbol("a", 1, 1);
        g.symbol("b", 1, 1);
        let mut other = Graph::new();
        other.symbol("c", 1, 1);
        let foreign = other.symbol("d", 1, 1);
        let err = Evaluation::create(&mut g, square(), &[foreign], 0).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound(1));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn selects_requested_output() {
        let mut g = Graph::new();
        let u = g.symbol("u", 1, 1);
        let v = g.symbol("v", 1, 1);
        let f = prod_diff();
        let diff = Evaluation::create(&mut g, Rc::clone(&f), &[u, v], 1).unwrap();
        g.set_value(u, &[5.0]).unwrap();
        g.set_value(v, &[2.0]).unwrap();
        g.evaluate_node(diff, Mode::Primal).unwrap();
        assert_eq!(g.value(diff).unwrap().data(), &[3.0]);
    }

    #[test]
    fn forward_extracts_selected_tangent() {
        let mut g = Graph::new();
        let u = g.symbol("u", 1, 1);
        let v = g.symbol("v", 1, 1);
        let prod = Evaluation::create(&mut g, prod_diff(), &[u, v], 0).unwrap();
        g.set_value(u, &[5.0]).unwrap();
        g.set_value(v, &[2.0]).unwrap();
        g.set_sensitivity(u, &[1.0]).unwrap();
        g.set_sensitivity(v, &[3.0]).unwrap();
        g.evaluate_node(prod, Mode::Forward).unwrap();
        // v du + u dv = 2 + 15
        assert_eq!(g.sensitivity(prod).unwrap().data(), &[17.0]);
    }

    #[test]
    fn primal_leaves_sensitivities_alone() {
        let mut g = Graph::new();
        let x = g.symbol("x", 1, 1);
        let y = Evaluation::create(&mut g, square(), &[x], 0).unwrap();
        g.set_value(x, &[3.0]).unwrap();
        g.set_sensitivity(x, &[0.25]).unwrap();
        g.set_sensitivity(y, &[0.5]).unwrap();
        g.evaluate_node(y, Mode::Primal).unwrap();
        assert_eq!(g.sensitivity(x).unwrap().data(), &[0.25]);
        assert_eq!(g.sensitivity(y).unwrap().data(), &[0.5]);
    }

    #[test]
    fn adjoint_accumulates_into_operands() {
        let mut g = Graph::new();
        let u = g.symbol("u", 1, 1);
        let v = g.symbol("v", 1, 1);
        let prod = Evaluation::create(&mut g, prod_diff(), &[u, v], 0).unwrap();
        g.set_value(u, &[5.0]).unwrap();
        g.set_value(v, &[2.0]).unwrap();
        g.set_sensitivity(u, &[10.0]).unwrap();
        g.set_sensitivity(prod, &[1.0]).unwrap();
        g.evaluate_node(prod, Mode::Adjoint).unwrap();
        assert_eq!(g.value(prod).unwrap().data(), &[10.0]);
        assert_eq!(g.sensitivity(u).unwrap().data(), &[12.0]);
        assert_eq!(g.sensitivity(v).unwrap().data(), &[5.0]);
    }

    #[test]
    fn repeated_operand_gets_both_contributions() {
        let mut g = Graph::new();
        let x = g.symbol("x", 1, 1);
        let xx = Evaluation::create(&mut g, prod_diff(), &[x, x], 0).unwrap();
        g.set_value(x, &[3.0]).unwrap();
        g.set_sensitivity(xx, &[1.0]).unwrap();
        g.evaluate_node(xx, Mode::Adjoint).unwrap();
        assert_eq!(g.value(xx).unwrap().data(), &[9.0]);
        assert_eq!(g.sensitivity(x).unwrap().data(), &[6.0]);
    }

    #[test]
    fn sibling_seeds_do_not_leak() {
        let mut g = Graph::new();
        let u = g.symbol("u", 1, 1);
        let v = g.symbol("v", 1, 1);
        let f = prod_diff();
        let prod = Evaluation::create(&mut g, Rc::clone(&f), &[u, v], 0).unwrap();
        let diff = Evaluation::create(&mut g, f, &[u, v], 1).unwrap();
        g.set_value(u, &[5.0]).unwrap();
        g.set_value(v, &[2.0]).unwrap();
        g.set_sensitivity(prod, &[1.0]).unwrap();
        g.set_sensitivity(diff, &[1.0]).unwrap();
        g.evaluate_node(diff, Mode::Adjoint).unwrap();
        g.evaluate_node(prod, Mode::Adjoint).unwrap();
        // d(uv + u - v) = (v + 1, u - 1)
        assert_eq!(g.sensitivity(u).unwrap().data(), &[3.0]);
        assert_eq!(g.sensitivity(v).unwrap().data(), &[4.0]);
    }

    #[test]
    fn busy_function_is_reported() {
        let mut g = Graph::new();
        let x = g.symbol("x", 1, 1);
        let f = square();
        let y = Evaluation::create(&mut g, Rc::clone(&f), &[x], 0).unwrap();
        let _guard = f.borrow_mut();
        assert_eq!(g.evaluate_node(y, Mode::Primal), Err(GraphError::FunctionBusy));
    }

    #[test]
    fn prints_placeholder_while_function_is_borrowed() {
        let mut g = Graph::new();
        let x = g.symbol("x", 1, 1);
        let f = square();
        let y = Evaluation::create(&mut g, Rc::clone(&f), &[x], 0).unwrap();
        let _guard = f.borrow_mut();
        assert_eq!(g.display(y).unwrap().to_string(), "<busy>[x]");
    }

    #[test]
    fn prints_function_applied_to_operands() {
        let mut g = Graph::new();
        let u = g.symbol("u", 1, 1);
        let v = g.symbol("v", 1, 1);
        let prod = Evaluation::create(&mut g, prod_diff(), &[u, v], 0).unwrap();
        let sq = Evaluation::create(&mut g, square(), &[prod], 0).unwrap();
        assert_eq!(g.display(sq).unwrap().to_string(), "sq[pd[u, v]]");
    }
}
