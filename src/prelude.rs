pub use crate::errors::{GraphError, Result};
pub use crate::evaluation::Evaluation;
pub use crate::function::{FunctionRef, Port, PortBank, PortFunction, Slot};
pub use crate::graph::{DisplayNode, Graph, NodeId};
pub use crate::jacobian::JacobianFunction;
pub use crate::matrix::DMatrix;
pub use crate::mode::Mode;
pub use crate::node::{Constant, Node, Operation, Symbol};
