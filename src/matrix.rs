//! Dense dimensioned values stored on graph nodes and function ports.

use core::fmt;
use ndarray::{Array2, ArrayView2};

use crate::errors::{GraphError, Result};

/// A dense `rows x cols` block of `f64` in row-major order.
///
/// The shape is fixed when the value is created; every mutation keeps
/// `data().len() == rows * cols`.
#[derive(Clone, Debug, PartialEq)]
pub struct DMatrix {
    data: Array2<f64>,
}

impl DMatrix {
    /// Creates a zero-filled value of the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
        }
    }

    /// Creates a value from a row-major buffer of exactly `rows * cols` entries.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        let found = data.len();
        Array2::from_shape_vec((rows, cols), data)
            .map(|data| Self { data })
            .map_err(|_| GraphError::shape("matrix construction", rows * cols, found))
    }

    /// Creates a 1x1 value.
    pub fn scalar(v: f64) -> Self {
        Self {
            data: Array2::from_elem((1, 1), v),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Number of stored entries.
    #[inline]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the row-major buffer.
    pub fn data(&self) -> &[f64] {
        self.data
            .as_slice()
            .expect("DMatrix is always in standard layout")
    }

    fn data_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_mut()
            .expect("DMatrix is always in standard layout")
    }

    /// Returns a two-dimensional view for linear algebra.
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Element at linear (row-major) index `k`.
    pub fn get(&self, k: usize) -> Result<f64> {
        self.data()
            .get(k)
            .copied()
            .ok_or_else(|| GraphError::out_of_range("element", k, self.numel()))
    }

    /// Element at `(r, c)`.
    pub fn at(&self, r: usize, c: usize) -> Result<f64> {
        self.check_coord(r, c)?;
        Ok(self.data[(r, c)])
    }

    pub fn set(&mut self, k: usize, v: f64) -> Result<()> {
        let len = self.numel();
        let slot = self
            .data_mut()
            .get_mut(k)
            .ok_or_else(|| GraphError::out_of_range("element", k, len))?;
        *slot = v;
        Ok(())
    }

    pub fn set_at(&mut self, r: usize, c: usize, v: f64) -> Result<()> {
        self.check_coord(r, c)?;
        self.data[(r, c)] = v;
        Ok(())
    }

    /// Overwrites the whole buffer with `src`, which must have `numel()` entries.
    pub fn assign(&mut self, src: &[f64]) -> Result<()> {
        self.check_len("assign", src.len())?;
        self.data_mut().copy_from_slice(src);
        Ok(())
    }

    /// Adds `src` element-wise into the buffer.
    pub fn accumulate(&mut self, src: &[f64]) -> Result<()> {
        self.check_len("accumulate", src.len())?;
        for (d, s) in self.data_mut().iter_mut().zip(src) {
            *d += s;
        }
        Ok(())
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(0.0);
    }

    fn check_len(&self, context: &'static str, found: usize) -> Result<()> {
        if found != self.numel() {
            return Err(GraphError::shape(context, self.numel(), found));
        }
        Ok(())
    }

    fn check_coord(&self, r: usize, c: usize) -> Result<()> {
        if r >= self.rows() {
            return Err(GraphError::out_of_range("row", r, self.rows()));
        }
        if c >= self.cols() {
            return Err(GraphError::out_of_range("column", c, self.cols()));
        }
        Ok(())
    }
}

impl fmt::Display for DMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape() == (1, 1) {
            return write!(f, "{}", self.data[(0, 0)]);
        }
        write!(f, "[")?;
        for (r, row) in self.data.rows().into_iter().enumerate() {
            if r > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (c, v) in row.iter().enumerate() {
                if c > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", v)?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}
