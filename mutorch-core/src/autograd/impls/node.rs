//! Scalar autograd: handles to differentiable nodes and their arithmetic.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::autograd::error::{AutogradError, Result};
use crate::autograd::graph::{Graph, NodeData, NodeId};
use crate::autograd::op::Op;
use crate::autograd::{Exp, Parameters, Pow, ScalarNode, Tanh};

/// Handle to a scalar node in a [`Graph`].
///
/// Cloning the handle does not copy the node: clones refer to the same arena slot, so a node
/// reused in several expressions is one node with several consumers.
#[derive(Clone)]
pub struct Node {
    graph: Graph,
    id: NodeId,
}

impl Node {
    pub(crate) fn from_parts(graph: Graph, id: NodeId) -> Self {
        Node { graph, id }
    }

    /// Position of this node in its graph's arena.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Graph that owns this node.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Diagnostic name (empty unless set with [`Node::with_name`]).
    #[must_use]
    pub fn name(&self) -> String {
        self.graph.with_node(self.id, |n| n.name.clone())
    }

    /// Attaches a diagnostic name and returns the same handle.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.graph.with_node_mut(self.id, |n| n.name = name);
        self
    }

    /// Whether backward passes deposit gradients into this node.
    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.graph.with_node(self.id, |n| n.grad.is_some())
    }

    /// Operation that produced this node; `None` for leaves.
    #[must_use]
    pub fn op(&self) -> Option<Op> {
        self.graph.with_node(self.id, |n| n.op)
    }

    /// Operand nodes, in operand order.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        let ids = self.graph.with_node(self.id, |n| n.children.clone());
        ids.into_iter()
            .map(|id| Node::from_parts(self.graph.clone(), id))
            .collect()
    }

    /// True for nodes created directly rather than by an operation.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.graph.with_node(self.id, |n| n.children.is_empty())
    }

    /// Overwrites the forward value. Intended for optimizer updates on parameter leaves;
    /// outputs already computed from this node keep their old values.
    pub fn set_value(&self, value: f64) {
        self.graph.with_node_mut(self.id, |n| n.value = value);
    }

    /// Absolute value, expressed as `self * sign(self)`.
    ///
    /// # Errors
    ///
    /// Returns [`AutogradError::UndefinedGradient`] when the value is zero.
    pub fn abs(&self) -> Result<Node> {
        let value = self.value();
        if value == 0.0 {
            return Err(AutogradError::UndefinedGradient { op: "abs", value });
        }
        Ok(self * (value / value.abs()))
    }

    /// A fresh tracked leaf in this node's graph.
    fn lift(&self, value: f64) -> Node {
        self.graph.leaf(value)
    }

    /// Allocates the output of `op` applied to `operands`.
    ///
    /// # Panics
    ///
    /// If the operands belong to different graphs.
    pub(crate) fn apply(op: Op, operands: &[&Node]) -> Node {
        let graph = &operands[0].graph;
        assert!(
            operands.iter().all(|n| n.graph.ptr_eq(graph)),
            "{op}: operands belong to different graphs"
        );
        let values: Vec<f64> = operands.iter().map(|n| n.value()).collect();
        let id = graph.push(NodeData {
            value: op.forward(&values),
            grad: Some(0.0),
            name: String::new(),
            op: Some(op),
            children: operands.iter().map(|n| n.id).collect(),
        });
        Node::from_parts(graph.clone(), id)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.graph.ptr_eq(&other.graph)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.graph.with_node(self.id, |n| {
            f.debug_struct("Node")
                .field("id", &self.id.index())
                .field("value", &n.value)
                .field("grad", &n.grad)
                .field("op", &n.op)
                .field("children", &n.children)
                .finish()
        })
    }
}

impl fmt::Display for Node {
    /// `Node(name=x, op=+, value=5, grad=1)`; name, op and grad are omitted when absent.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.graph.with_node(self.id, |n| {
            write!(f, "Node(")?;
            if !n.name.is_empty() {
                write!(f, "name={}, ", n.name)?;
            }
            if let Some(op) = n.op {
                write!(f, "op={op}, ")?;
            }
            write!(f, "value={}", n.value)?;
            if let Some(grad) = n.grad {
                write!(f, ", grad={grad}")?;
            }
            write!(f, ")")
        })
    }
}

impl ScalarNode for Node {
    fn value(&self) -> f64 {
        self.graph.value(self.id)
    }

    fn grad(&self) -> Option<f64> {
        self.graph.grad(self.id)
    }

    fn backward(&self) {
        self.graph.backward_from(&[(self.id, 1.0)]);
    }

    fn zero_grad(&self) {
        self.graph.zero_grad_from(&[self.id]);
    }
}

impl Parameters for Node {
    fn parameters(&self) -> Vec<Node> {
        vec![self.clone()]
    }
}

// -----------------------------------------------------------------------------
// std::ops: x + y, x - y, x * y, x / y, -x
// -----------------------------------------------------------------------------

impl Add for &Node {
    type Output = Node;

    fn add(self, rhs: Self) -> Node {
        Node::apply(Op::Add, &[self, rhs])
    }
}

impl Sub for &Node {
    type Output = Node;

    fn sub(self, rhs: Self) -> Node {
        self + &(-rhs)
    }
}

impl Mul for &Node {
    type Output = Node;

    fn mul(self, rhs: Self) -> Node {
        Node::apply(Op::Mul, &[self, rhs])
    }
}

impl Div for &Node {
    type Output = Node;

    fn div(self, rhs: Self) -> Node {
        self * &rhs.pow(-1.0)
    }
}

impl Neg for &Node {
    type Output = Node;

    fn neg(self) -> Node {
        self * &self.lift(-1.0)
    }
}

impl Neg for Node {
    type Output = Node;

    fn neg(self) -> Node {
        -&self
    }
}

/// Forwards the owned and mixed-reference forms, and `f64` operands on either side, to the
/// `&Node op &Node` implementations. Numbers become fresh tracked leaves in the node's graph.
macro_rules! forward_binop {
    ($($trait:ident :: $method:ident),*) => {$(
        impl $trait<Node> for Node {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&Node> for Node {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Node {
                (&self).$method(rhs)
            }
        }

        impl $trait<Node> for &Node {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                self.$method(&rhs)
            }
        }

        impl $trait<f64> for &Node {
            type Output = Node;
            fn $method(self, rhs: f64) -> Node {
                self.$method(&self.lift(rhs))
            }
        }

        impl $trait<f64> for Node {
            type Output = Node;
            fn $method(self, rhs: f64) -> Node {
                (&self).$method(rhs)
            }
        }

        impl $trait<&Node> for f64 {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Node {
                (&rhs.lift(self)).$method(rhs)
            }
        }

        impl $trait<Node> for f64 {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                self.$method(&rhs)
            }
        }
    )*};
}

forward_binop!(Add::add, Sub::sub, Mul::mul, Div::div);

// -----------------------------------------------------------------------------
// Pow, Exp, Tanh: (&a).pow(k), (&a).exp(), (&a).tanh()
// -----------------------------------------------------------------------------

impl Pow<&Node> for &Node {
    type Output = Node;

    fn pow(self, exp: &Node) -> Node {
        Node::apply(Op::Pow, &[self, exp])
    }
}

impl Pow<f64> for &Node {
    type Output = Node;

    fn pow(self, exp: f64) -> Node {
        self.pow(&self.lift(exp))
    }
}

impl Pow<f64> for Node {
    type Output = Node;

    fn pow(self, exp: f64) -> Node {
        (&self).pow(exp)
    }
}

impl Exp for &Node {
    type Output = Node;

    fn exp(self) -> Node {
        Node::apply(Op::Exp, &[self])
    }
}

impl Exp for Node {
    type Output = Node;

    fn exp(self) -> Node {
        (&self).exp()
    }
}

impl Tanh for &Node {
    type Output = Node;

    fn tanh(self) -> Node {
        Node::apply(Op::Tanh, &[self])
    }
}

impl Tanh for Node {
    type Output = Node;

    fn tanh(self) -> Node {
        (&self).tanh()
    }
}
