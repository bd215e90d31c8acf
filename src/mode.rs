//! Propagation modes for a single evaluation call.

use core::fmt;

use crate::errors::{GraphError, Result};

/// What an `evaluate` call propagates besides primal values.
///
/// Forward and adjoint propagation are separate variants, so a call can never
/// request both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Primal values only.
    Primal,
    /// Primal values and first-order tangents, inputs to outputs.
    Forward,
    /// Primal values, then first-order adjoints, outputs to inputs.
    Adjoint,
}

impl Mode {
    /// Maps a `(forward order, adjoint order)` pair onto a mode.
    pub fn from_orders(forward: u8, adjoint: u8) -> Result<Self> {
        match (forward, adjoint) {
            (0, 0) => Ok(Mode::Primal),
            (1, 0) => Ok(Mode::Forward),
            (0, 1) => Ok(Mode::Adjoint),
            _ => Err(GraphError::InvalidMode { forward, adjoint }),
        }
    }

    #[inline]
    pub fn forward_order(self) -> u8 {
        u8::from(self == Mode::Forward)
    }

    #[inline]
    pub fn adjoint_order(self) -> u8 {
        u8::from(self == Mode::Adjoint)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Primal => "primal",
            Mode::Forward => "forward",
            Mode::Adjoint => "adjoint",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_round_trip() {
        for mode in [Mode::Primal, Mode::Forward, Mode::Adjoint] {
            let back = Mode::from_orders(mode.forward_order(), mode.adjoint_order()).unwrap();
            assert_eq!(back, mode);
        }
    }

    #[test]
    fn both_orders_rejected() {
        assert_eq!(
            Mode::from_orders(1, 1),
            Err(GraphError::InvalidMode {
                forward: 1,
                adjoint: 1
            })
        );
        assert!(Mode::from_orders(2, 0).is_err());
        assert!(Mode::from_orders(0, 2).is_err());
    }
}
