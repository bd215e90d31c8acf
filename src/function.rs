//! Port interface of black-box functions embedded in the graph.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::{GraphError, Result};
use crate::matrix::DMatrix;
use crate::mode::Mode;

/// Shared handle to a wrapped function. Several nodes may hold the same one.
pub type FunctionRef = Rc<RefCell<dyn PortFunction>>;

/// Selects one of the three slots carried by every port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Value,
    Tangent,
    Adjoint,
}

/// A function with declared input and output ports, seen by the graph only
/// through per-port reads and writes plus a single `evaluate` entry point.
///
/// Port state persists between calls. `evaluate` reads whatever the slots
/// hold at call time:
/// - `Mode::Primal` writes output values from input values;
/// - `Mode::Forward` additionally writes output tangents from input tangents;
/// - `Mode::Adjoint` overwrites input adjoints from output adjoints, at the
///   current input values.
pub trait PortFunction: fmt::Display {
    fn input_count(&self) -> usize;
    fn output_count(&self) -> usize;
    fn input_shape(&self, i: usize) -> Result<(usize, usize)>;
    fn output_shape(&self, j: usize) -> Result<(usize, usize)>;

    fn input(&self, i: usize, slot: Slot) -> Result<&DMatrix>;
    fn set_input(&mut self, i: usize, slot: Slot, data: &[f64]) -> Result<()>;
    fn output(&self, j: usize, slot: Slot) -> Result<&DMatrix>;
    fn set_output(&mut self, j: usize, slot: Slot, data: &[f64]) -> Result<()>;

    fn evaluate(&mut self, mode: Mode) -> Result<()>;

    /// Zeroes every tangent and adjoint slot.
    fn reset_sensitivities(&mut self) -> Result<()> {
        for i in 0..self.input_count() {
            let n = self.input(i, Slot::Value)?.numel();
            self.set_input(i, Slot::Tangent, &vec![0.0; n])?;
            self.set_input(i, Slot::Adjoint, &vec![0.0; n])?;
        }
        for j in 0..self.output_count() {
            let n = self.output(j, Slot::Value)?.numel();
            self.set_output(j, Slot::Tangent, &vec![0.0; n])?;
            self.set_output(j, Slot::Adjoint, &vec![0.0; n])?;
        }
        Ok(())
    }
}

/// Value, tangent and adjoint storage of one port.
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    pub value: DMatrix,
    pub tangent: DMatrix,
    pub adjoint: DMatrix,
}

impl Port {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            value: DMatrix::zeros(rows, cols),
            tangent: DMatrix::zeros(rows, cols),
            adjoint: DMatrix::zeros(rows, cols),
        }
    }

    #[inline]
    pub fn slot(&self, slot: Slot) -> &DMatrix {
        match slot {
            Slot::Value => &self.value,
            Slot::Tangent => &self.tangent,
            Slot::Adjoint => &self.adjoint,
        }
    }

    #[inline]
    pub fn slot_mut(&mut self, slot: Slot) -> &mut DMatrix {
        match slot {
            Slot::Value => &mut self.value,
            Slot::Tangent => &mut self.tangent,
            Slot::Adjoint => &mut self.adjoint,
        }
    }
}

/// All ports of a function, sized from its declared shapes.
///
/// Implementors of [`PortFunction`] can delegate their port accessors here.
#[derive(Clone, Debug, Default)]
pub struct PortBank {
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl PortBank {
    pub fn new(input_shapes: &[(usize, usize)], output_shapes: &[(usize, usize)]) -> Self {
        Self {
            inputs: input_shapes.iter().map(|&(r, c)| Port::new(r, c)).collect(),
            outputs: output_shapes.iter().map(|&(r, c)| Port::new(r, c)).collect(),
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_port(&self, i: usize) -> Result<&Port> {
        self.inputs
            .get(i)
            .ok_or_else(|| GraphError::out_of_range("input port", i, self.inputs.len()))
    }

    pub fn input_port_mut(&mut self, i: usize) -> Result<&mut Port> {
        let len = self.inputs.len();
        self.inputs
            .get_mut(i)
            .ok_or_else(|| GraphError::out_of_range("input port", i, len))
    }

    pub fn output_port(&self, j: usize) -> Result<&Port> {
        self.outputs
            .get(j)
            .ok_or_else(|| GraphError::out_of_range("output port", j, self.outputs.len()))
    }

    pub fn output_port_mut(&mut self, j: usize) -> Result<&mut Port> {
        let len = self.outputs.len();
        self.outputs
            .get_mut(j)
            .ok_or_else(|| GraphError::out_of_range("output port", j, len))
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs_mut(&mut self) -> &mut [Port] {
        &mut self.outputs
    }

    pub fn input_shape(&self, i: usize) -> Result<(usize, usize)> {
        Ok(self.input_port(i)?.value.shape())
    }

    pub fn output_shape(&self, j: usize) -> Result<(usize, usize)> {
        Ok(self.output_port(j)?.value.shape())
    }

    pub fn input(&self, i: usize, slot: Slot) -> Result<&DMatrix> {
        Ok(self.input_port(i)?.slot(slot))
    }

    pub fn set_input(&mut self, i: usize, slot: Slot, data: &[f64]) -> Result<()> {
        self.input_port_mut(i)?.slot_mut(slot).assign(data)
    }

    pub fn output(&self, j: usize, slot: Slot) -> Result<&DMatrix> {
        Ok(self.output_port(j)?.slot(slot))
    }

    pub fn set_output(&mut self, j: usize, slot: Slot, data: &[f64]) -> Result<()> {
        self.output_port_mut(j)?.slot_mut(slot).assign(data)
    }
}
