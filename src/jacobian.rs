//! A wrapped function defined by a primal closure and its Jacobian.

use core::fmt;
use ndarray::{Array1, ArrayView1};

use crate::errors::{GraphError, Result};
use crate::function::{PortBank, PortFunction, Slot};
use crate::matrix::DMatrix;
use crate::mode::Mode;

/// Computes every output buffer from the input buffers.
pub type PrimalFn = Box<dyn Fn(&[&[f64]]) -> Result<Vec<Vec<f64>>>>;
/// Computes the Jacobian blocks `J[j][i] = d out_j / d in_i`, each of shape
/// `(numel(out_j), numel(in_i))`.
pub type JacobianFn = Box<dyn Fn(&[&[f64]]) -> Result<Vec<Vec<DMatrix>>>>;

/// A [`PortFunction`] whose derivatives come from an explicit dense Jacobian.
///
/// Forward mode pushes input tangents through `J`, adjoint mode pulls output
/// adjoints back through `Jᵀ`. Both evaluate `J` at the current input values.
pub struct JacobianFunction {
    name: String,
    ports: PortBank,
    primal: PrimalFn,
    jacobian: JacobianFn,
}

impl JacobianFunction {
    pub fn new<P, J>(
        name: impl Into<String>,
        input_shapes: &[(usize, usize)],
        output_shapes: &[(usize, usize)],
        primal: P,
        jacobian: J,
    ) -> Self
    where
        P: Fn(&[&[f64]]) -> Result<Vec<Vec<f64>>> + 'static,
        J: Fn(&[&[f64]]) -> Result<Vec<Vec<DMatrix>>> + 'static,
    {
        Self {
            name: name.into(),
            ports: PortBank::new(input_shapes, output_shapes),
            primal: Box::new(primal),
            jacobian: Box::new(jacobian),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn eval_jacobian(&self, args: &[&[f64]]) -> Result<Vec<Vec<DMatrix>>> {
        let jac = (self.jacobian)(args)?;
        let n_out = self.ports.output_count();
        let n_in = self.ports.input_count();
        if jac.len() != n_out {
            return Err(GraphError::shape("jacobian output blocks", n_out, jac.len()));
        }
        for (j, row) in jac.iter().enumerate() {
            if row.len() != n_in {
                return Err(GraphError::shape("jacobian input blocks", n_in, row.len()));
            }
            let m = self.ports.output(j, Slot::Value)?.numel();
            for (i, block) in row.iter().enumerate() {
                let n = self.ports.input(i, Slot::Value)?.numel();
                if block.shape() != (m, n) {
                    return Err(GraphError::shape(
                        "jacobian block",
                        format!("{}x{}", m, n),
                        format!("{}x{}", block.rows(), block.cols()),
                    ));
                }
            }
        }
        Ok(jac)
    }

    fn forward(&mut self, with_tangents: bool) -> Result<()> {
        let args: Vec<&[f64]> = self.ports.inputs().iter().map(|p| p.value.data()).collect();
        let values = (self.primal)(&args)?;
        if values.len() != self.ports.output_count() {
            return Err(GraphError::shape(
                "function outputs",
                self.ports.output_count(),
                values.len(),
            ));
        }
        let tangents = if with_tangents {
            let jac = self.eval_jacobian(&args)?;
            let seeds: Vec<ArrayView1<'_, f64>> = self
                .ports
                .inputs()
                .iter()
                .map(|p| ArrayView1::from(p.tangent.data()))
                .collect();
            let out = jac
                .iter()
                .enumerate()
                .map(|(j, row)| {
                    let m = self.ports.output(j, Slot::Value)?.numel();
                    let mut acc = Array1::<f64>::zeros(m);
                    for (block, seed) in row.iter().zip(&seeds) {
                        acc += &block.view().dot(seed);
                    }
                    Ok::<_, GraphError>(acc.to_vec())
                })
                .collect::<Result<Vec<_>>>()?;
            Some(out)
        } else {
            None
        };

        for (port, value) in self.ports.outputs_mut().iter_mut().zip(&values) {
            port.value.assign(value)?;
        }
        if let Some(tangents) = tangents {
            for (port, tangent) in self.ports.outputs_mut().iter_mut().zip(&tangents) {
                port.tangent.assign(tangent)?;
            }
        }
        Ok(())
    }

    fn reverse(&mut self) -> Result<()> {
        let args: Vec<&[f64]> = self.ports.inputs().iter().map(|p| p.value.data()).collect();
        let jac = self.eval_jacobian(&args)?;
        let mut adjoints: Vec<Array1<f64>> = self
            .ports
            .inputs()
            .iter()
            .map(|p| Array1::zeros(p.value.numel()))
            .collect();
        for (j, row) in jac.iter().enumerate() {
            let seed = ArrayView1::from(self.ports.output(j, Slot::Adjoint)?.data());
            for (acc, block) in adjoints.iter_mut().zip(row) {
                *acc += &block.view().t().dot(&seed);
            }
        }
        for (i, adj) in adjoints.iter().enumerate() {
            self.ports.set_input(i, Slot::Adjoint, &adj.to_vec())?;
        }
        Ok(())
    }
}

impl PortFunction for JacobianFunction {
    fn input_count(&self) -> usize {
        self.ports.input_count()
    }

    fn output_count(&self) -> usize {
        self.ports.output_count()
    }

    fn input_shape(&self, i: usize) -> Result<(usize, usize)> {
        self.ports.input_shape(i)
    }

    fn output_shape(&self, j: usize) -> Result<(usize, usize)> {
        self.ports.output_shape(j)
    }

    fn input(&self, i: usize, slot: Slot) -> Result<&DMatrix> {
        self.ports.input(i, slot)
    }

    fn set_input(&mut self, i: usize, slot: Slot, data: &[f64]) -> Result<()> {
        self.ports.set_input(i, slot, data)
    }

    fn output(&self, j: usize, slot: Slot) -> Result<&DMatrix> {
        self.ports.output(j, slot)
    }

    fn set_output(&mut self, j: usize, slot: Slot, data: &[f64]) -> Result<()> {
        self.ports.set_output(j, slot, data)
    }

    fn evaluate(&mut self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Primal => self.forward(false),
            Mode::Forward => self.forward(true),
            Mode::Adjoint => self.reverse(),
        }
    }
}

impl fmt::Display for JacobianFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for JacobianFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JacobianFunction")
            .field("name", &self.name)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}
