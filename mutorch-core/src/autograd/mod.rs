//! Autograd: an arena-backed scalar computation graph and tensors built from its nodes.
//!
//! Every operation evaluates eagerly and records its operands and an [`Op`] tag in the owning
//! [`Graph`]. [`ScalarNode::backward`] seeds the node with `1.0` and walks the reachable graph in
//! reverse topological order, so a node shared by several consumers fires its rule only after
//! all of their contributions have arrived.

pub mod data;
pub mod error;
pub mod graph;
pub mod impls;
pub mod op;
pub mod shape;

pub use data::{Element, TensorData};
pub use error::{AutogradError, Result};
pub use graph::{Graph, NodeId};
pub use impls::node::Node;
pub use impls::tensor::{Operand, Tensor};
pub use op::Op;
pub use shape::{FlattenOrder, Shape, MAX_RANK};

/// Trait for raising a node to a power (e.g. `(&a).pow(2.0)`).
///
/// The exponent is a constant as far as gradients go: nothing flows back into it.
pub trait Pow<Rhs> {
    /// Result of the power operation.
    type Output;

    /// Returns `self^exp` with gradient tracking.
    #[must_use]
    fn pow(self, exp: Rhs) -> Self::Output;
}

/// Trait for the exponential of a node (e.g. `(&a).exp()`).
pub trait Exp {
    /// Result of the exponential.
    type Output;

    /// Returns `exp(self)` with gradient tracking.
    #[must_use]
    fn exp(self) -> Self::Output;
}

/// Trait for the hyperbolic tangent of a node (e.g. `(&a).tanh()`).
pub trait Tanh {
    /// Result of the tanh.
    type Output;

    /// Returns `tanh(self)` with gradient tracking.
    #[must_use]
    fn tanh(self) -> Self::Output;
}

/// A differentiable scalar in the computation graph.
///
/// Use [`ScalarNode::value`] for the forward value and [`ScalarNode::grad`] after
/// [`ScalarNode::backward`].
pub trait ScalarNode: Clone {
    /// Returns the forward pass value.
    fn value(&self) -> f64;

    /// Returns ∂seed/∂self after a backward pass; `None` if the node does not track gradients.
    fn grad(&self) -> Option<f64>;

    /// Sets this node's gradient to `1.0` and propagates to everything it was computed from.
    fn backward(&self);

    /// Resets the gradient of this node and of everything it was computed from.
    fn zero_grad(&self);
}

/// Something that owns trainable leaves (a tensor, a layer, a model).
pub trait Parameters {
    /// Leaves an optimizer should update.
    fn parameters(&self) -> Vec<Node>;

    /// Number of leaves returned by [`Parameters::parameters`].
    fn num_parameters(&self) -> usize {
        self.parameters().len()
    }
}

impl<P: Parameters> Parameters for [P] {
    fn parameters(&self) -> Vec<Node> {
        self.iter().flat_map(Parameters::parameters).collect()
    }
}

impl<P: Parameters> Parameters for Vec<P> {
    fn parameters(&self) -> Vec<Node> {
        self.as_slice().parameters()
    }
}
