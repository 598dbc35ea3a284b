//! # mutorch-core
//!
//! Minimal reverse-mode automatic differentiation: differentiable scalars recorded in an
//! arena-backed computation graph, and rank 1–4 tensors that lift scalar arithmetic to whole
//! arrays with a small, fixed broadcasting policy.
//!
//! ```
//! use mutorch_core::{Graph, ScalarNode};
//!
//! let g = Graph::new();
//! let x = g.leaf(2.0);
//! let y = g.leaf(3.0);
//! let z = &(&x * &y) + &x;
//! z.backward();
//! assert_eq!(x.grad(), Some(4.0));
//! assert_eq!(y.grad(), Some(2.0));
//! ```

pub mod autograd;
pub mod config;

pub use autograd::{
    AutogradError, Exp, FlattenOrder, Graph, Node, NodeId, Op, Operand, Parameters, Pow,
    ScalarNode, Shape, Tanh, Tensor,
};
pub use config::{Config, ConfigError};
