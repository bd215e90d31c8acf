//! Expression graphs with forward and reverse automatic differentiation.
//!
//! Nodes live in a [`graph::Graph`] arena and reference their operands by id.
//! An [`evaluation::Evaluation`] node embeds one output of a black-box
//! [`function::PortFunction`] and threads primal values, tangents and
//! adjoints through its ports.

pub mod errors;
pub mod evaluation;
pub mod function;
pub mod graph;
pub mod jacobian;
pub mod matrix;
pub mod mode;
pub mod node;
pub mod prelude;
