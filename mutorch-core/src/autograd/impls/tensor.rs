//! Tensor autograd: rank 1–4 containers of scalar nodes with broadcasting elementwise algebra.

use std::fmt;
use std::ops::Neg;

use rand::Rng;
use rand_distr::Distribution;
use tracing::instrument;

use super::node::Node;
use crate::autograd::data::TensorData;
use crate::autograd::error::{AutogradError, Result};
use crate::autograd::graph::{Graph, NodeId};
use crate::autograd::shape::{Broadcast, FlattenOrder, Shape};
use crate::autograd::{Exp, Parameters, Pow, ScalarNode, Tanh};

/// Right operand of a tensor operation.
///
/// Numbers become a fresh `(1, 1)` leaf and a node becomes a `(1, 1)` tensor that references
/// it; both then follow the scalar broadcast rule.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    /// A plain number, lifted into a fresh leaf.
    Scalar(f64),
    /// An existing node, broadcast as a `(1, 1)` tensor.
    Node(&'a Node),
    /// A tensor, subject to the broadcast rules.
    Tensor(&'a Tensor),
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl<'a> From<&'a Node> for Operand<'a> {
    fn from(node: &'a Node) -> Self {
        Operand::Node(node)
    }
}

impl<'a> From<&'a Tensor> for Operand<'a> {
    fn from(tensor: &'a Tensor) -> Self {
        Operand::Tensor(tensor)
    }
}

/// A rectangular tensor of [`Node`]s.
///
/// Elements are stored row-major as ids into the owning [`Graph`]. Operations never mutate a
/// tensor; they return a new one whose elements are either existing nodes or freshly computed
/// outputs.
#[derive(Clone)]
pub struct Tensor {
    graph: Graph,
    shape: Shape,
    nodes: Vec<NodeId>,
    requires_grad: bool,
}

impl Tensor {
    /// Builds a tensor from a number, a node, or nested `Vec`s/arrays (depth 1–4) of either.
    ///
    /// Uses the graph's default `requires_grad`. A flat sequence becomes a `(1, n)` row.
    ///
    /// # Errors
    ///
    /// Ragged or empty input, or nodes from another graph.
    pub fn new(graph: &Graph, data: impl TensorData) -> Result<Self> {
        Self::with_requires_grad(graph, data, graph.default_requires_grad())
    }

    /// Like [`Tensor::new`] with an explicit flag; fresh leaves inherit it.
    pub fn with_requires_grad(
        graph: &Graph,
        data: impl TensorData,
        requires_grad: bool,
    ) -> Result<Self> {
        let (shape, nodes) = data.into_parts(graph, requires_grad)?;
        Ok(Self::from_parts(graph.clone(), shape, nodes, requires_grad))
    }

    /// Builds a tensor of any rank 1–4 from row-major values.
    ///
    /// # Errors
    ///
    /// Invalid shape, or `values.len()` different from the shape's element count.
    pub fn from_shape(graph: &Graph, dims: &[usize], values: Vec<f64>) -> Result<Self> {
        let shape = Shape::new(dims)?;
        if values.len() != shape.numel() {
            return Err(AutogradError::LengthMismatch {
                shape,
                actual: values.len(),
            });
        }
        let requires_grad = graph.default_requires_grad();
        let nodes = values
            .into_iter()
            .map(|v| graph.leaf_with(v, requires_grad).id())
            .collect();
        Ok(Self::from_parts(graph.clone(), shape, nodes, requires_grad))
    }

    /// Builds a tensor whose leaves are sampled from `distribution`.
    ///
    /// ```
    /// use mutorch_core::{Graph, Tensor};
    /// use rand::SeedableRng;
    /// use rand_distr::Uniform;
    ///
    /// let g = Graph::new();
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    /// let w = Tensor::random(&g, &[3, 4], &Uniform::new(-1.0, 1.0).unwrap(), &mut rng).unwrap();
    /// assert!(w.values().iter().all(|v| (-1.0..1.0).contains(v)));
    /// ```
    pub fn random<D, R>(graph: &Graph, dims: &[usize], distribution: &D, rng: &mut R) -> Result<Self>
    where
        D: Distribution<f64>,
        R: Rng + ?Sized,
    {
        let shape = Shape::new(dims)?;
        let values = (0..shape.numel()).map(|_| distribution.sample(rng)).collect();
        Self::from_shape(graph, dims, values)
    }

    /// Stacks equally shaped tensors along a new leading axis.
    ///
    /// Rows of shape `(1, n)` stack into `(k, n)`; any other shape `s` stacks into `(k, ..s)`.
    ///
    /// # Errors
    ///
    /// Empty input, differing shapes or graphs, or a result above rank 4.
    pub fn stack(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors.first().ok_or(AutogradError::EmptyAxis { axis: 0 })?;
        for t in &tensors[1..] {
            if !t.graph.ptr_eq(&first.graph) {
                return Err(AutogradError::ForeignNode);
            }
            if t.shape != first.shape {
                return Err(AutogradError::ShapeMismatch {
                    op: "stack",
                    left: first.shape.clone(),
                    right: t.shape.clone(),
                });
            }
        }

        let inner = first.shape.dims();
        let mut dims = vec![tensors.len()];
        if inner.len() == 2 && inner[0] == 1 {
            dims.push(inner[1]);
        } else {
            dims.extend_from_slice(inner);
        }
        let shape = Shape::new(&dims)?;
        let nodes = tensors.iter().flat_map(|t| t.nodes.iter().copied()).collect();
        let requires_grad = first.graph.default_requires_grad();
        Ok(Self::from_parts(first.graph.clone(), shape, nodes, requires_grad))
    }

    fn from_parts(graph: Graph, shape: Shape, nodes: Vec<NodeId>, requires_grad: bool) -> Self {
        debug_assert_eq!(shape.numel(), nodes.len());
        Tensor {
            graph,
            shape,
            nodes,
            requires_grad,
        }
    }

    /// A tensor over `nodes` with this tensor's graph and `requires_grad`.
    fn derive(&self, shape: Shape, nodes: Vec<Node>) -> Self {
        let ids = nodes.iter().map(Node::id).collect();
        Self::from_parts(self.graph.clone(), shape, ids, self.requires_grad)
    }

    fn node(&self, id: NodeId) -> Node {
        Node::from_parts(self.graph.clone(), id)
    }

    /// Extents of this tensor.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.nodes.len()
    }

    /// Whether operations on this tensor propagate gradients.
    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Graph that owns every element.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Element at a multi-index.
    ///
    /// # Errors
    ///
    /// [`AutogradError::IndexOutOfBounds`] if the index does not address an element.
    pub fn get(&self, index: &[usize]) -> Result<Node> {
        self.shape
            .offset(index)
            .map(|offset| self.node(self.nodes[offset]))
            .ok_or_else(|| AutogradError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            })
    }

    /// Element handles in row-major order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(|&id| self.node(id)).collect()
    }

    /// Forward values in row-major order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.nodes.iter().map(|&id| self.graph.value(id)).collect()
    }

    /// Gradients in row-major order; `None` for elements that do not track gradients.
    #[must_use]
    pub fn grads(&self) -> Vec<Option<f64>> {
        self.nodes.iter().map(|&id| self.graph.grad(id)).collect()
    }

    // -------------------------------------------------------------------------
    // Elementwise algebra
    // -------------------------------------------------------------------------

    /// Classifies `rhs` against this tensor and returns its nodes, before the right operand
    /// allocates anything.
    fn broadcast_rhs(
        &self,
        op: &'static str,
        rhs: Operand<'_>,
        allow_elementwise: bool,
    ) -> Result<(Broadcast, Vec<Node>)> {
        let rhs_shape = match rhs {
            Operand::Scalar(_) => Shape::scalar(),
            Operand::Node(node) => {
                if !node.graph().ptr_eq(&self.graph) {
                    return Err(AutogradError::ForeignNode);
                }
                Shape::scalar()
            }
            Operand::Tensor(tensor) => {
                if !tensor.graph.ptr_eq(&self.graph) {
                    return Err(AutogradError::ForeignNode);
                }
                tensor.shape.clone()
            }
        };
        let mode = Broadcast::classify(op, &self.shape, &rhs_shape, allow_elementwise)?;
        let nodes = match rhs {
            Operand::Scalar(value) => vec![self.graph.leaf(value)],
            Operand::Node(node) => vec![node.clone()],
            Operand::Tensor(tensor) => tensor.nodes(),
        };
        Ok((mode, nodes))
    }

    /// Pairs every element with its broadcast right-hand node.
    fn combine(
        &self,
        mode: Broadcast,
        rhs: &[Node],
        f: impl Fn(&Node, &Node) -> Node,
    ) -> Tensor {
        let dense = mode.expand(&self.shape, rhs);
        let out = self
            .nodes()
            .iter()
            .zip(&dense)
            .map(|(a, b)| f(a, b))
            .collect();
        self.derive(self.shape.clone(), out)
    }

    /// Elementwise sum with broadcasting.
    ///
    /// # Errors
    ///
    /// [`AutogradError::ShapeMismatch`] unless the right shape is identical, `(1, shape[0])`
    /// or `(1, 1)`.
    #[instrument(level = "debug", skip_all, fields(shape = %self.shape))]
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Tensor> {
        let (mode, rhs) = self.broadcast_rhs("add", rhs.into(), true)?;
        Ok(self.combine(mode, &rhs, |a, b| a + b))
    }

    /// Elementwise difference with broadcasting.
    #[instrument(level = "debug", skip_all, fields(shape = %self.shape))]
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Tensor> {
        let (mode, rhs) = self.broadcast_rhs("sub", rhs.into(), true)?;
        Ok(self.combine(mode, &rhs, |a, b| a - b))
    }

    /// Elementwise product with broadcasting.
    #[instrument(level = "debug", skip_all, fields(shape = %self.shape))]
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Tensor> {
        let (mode, rhs) = self.broadcast_rhs("mul", rhs.into(), true)?;
        Ok(self.combine(mode, &rhs, |a, b| a * b))
    }

    /// Elementwise quotient: multiplies by the reciprocal of each distinct right-hand node.
    #[instrument(level = "debug", skip_all, fields(shape = %self.shape))]
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Tensor> {
        let (mode, rhs) = self.broadcast_rhs("div", rhs.into(), true)?;
        let reciprocals: Vec<Node> = rhs.iter().map(|n| n.pow(-1.0)).collect();
        Ok(self.combine(mode, &reciprocals, |a, b| a * b))
    }

    /// Elementwise power. The exponent must be `(1, 1)` or `(1, shape[0])`.
    ///
    /// # Errors
    ///
    /// [`AutogradError::ShapeMismatch`] for any other exponent shape, including an identical one.
    #[instrument(level = "debug", skip_all, fields(shape = %self.shape))]
    pub fn pow<'a>(&self, exponent: impl Into<Operand<'a>>) -> Result<Tensor> {
        let (mode, rhs) = self.broadcast_rhs("pow", exponent.into(), false)?;
        Ok(self.combine(mode, &rhs, |a, k| a.pow(k)))
    }

    fn map(&self, f: impl Fn(&Node) -> Node) -> Tensor {
        let out = self.nodes().iter().map(f).collect();
        self.derive(self.shape.clone(), out)
    }

    /// Elementwise hyperbolic tangent.
    #[must_use]
    pub fn tanh(&self) -> Tensor {
        self.map(|n| n.tanh())
    }

    /// Elementwise exponential.
    #[must_use]
    pub fn exp(&self) -> Tensor {
        self.map(|n| n.exp())
    }

    // -------------------------------------------------------------------------
    // Reductions and layout
    // -------------------------------------------------------------------------

    /// Sum of every element as a `(1, 1)` tensor, folded row-major onto a zero leaf.
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total = self
            .nodes()
            .iter()
            .fold(self.graph.leaf_with(0.0, self.requires_grad), |acc, n| &acc + n);
        self.derive(Shape::scalar(), vec![total])
    }

    /// Mean of a rank-2 tensor.
    ///
    /// # Errors
    ///
    /// [`AutogradError::RankReduction`] for any other rank.
    pub fn mean(&self) -> Result<Tensor> {
        let [rows, cols] = self.shape.dims() else {
            return Err(AutogradError::RankReduction {
                op: "mean",
                rank: self.rank(),
            });
        };
        self.sum().div((rows * cols) as f64)
    }

    /// The single value of a `(1, 1)` tensor.
    ///
    /// # Errors
    ///
    /// [`AutogradError::NotScalar`] for any other shape.
    pub fn item(&self) -> Result<f64> {
        if !self.shape.is_scalar() {
            return Err(AutogradError::NotScalar {
                shape: self.shape.clone(),
            });
        }
        Ok(self.graph.value(self.nodes[0]))
    }

    /// Values in [`Tensor::flatten`] order.
    #[must_use]
    pub fn items(&self) -> Vec<f64> {
        self.flatten().values()
    }

    /// Re-linearises into a `(1, numel)` tensor over the same nodes, in the graph's configured
    /// [`FlattenOrder`].
    #[must_use]
    pub fn flatten(&self) -> Tensor {
        self.flatten_with(self.graph.flatten_order())
    }

    /// Re-linearises into a `(1, numel)` tensor over the same nodes in the given order.
    #[must_use]
    pub fn flatten_with(&self, order: FlattenOrder) -> Tensor {
        let nodes = self
            .shape
            .permutation(order)
            .into_iter()
            .map(|offset| self.nodes[offset])
            .collect();
        Self::from_parts(
            self.graph.clone(),
            Shape::row(self.numel()),
            nodes,
            self.requires_grad,
        )
    }

    // -------------------------------------------------------------------------
    // Gradients
    // -------------------------------------------------------------------------

    /// Propagates a ones upstream gradient from every element in one pass, which is the
    /// gradient of [`Tensor::sum`]. Does nothing unless `requires_grad`.
    pub fn backward(&self) {
        if !self.requires_grad {
            return;
        }
        let seeds: Vec<(NodeId, f64)> = self.nodes.iter().map(|&id| (id, 1.0)).collect();
        self.graph.backward_from(&seeds);
    }

    /// Vector-Jacobian product: seeds each element with the matching entry of `upstream` and
    /// propagates once. Elements that share a node receive the sum of their entries.
    ///
    /// # Errors
    ///
    /// [`AutogradError::ShapeMismatch`] unless `upstream` has this tensor's shape.
    pub fn backward_with(&self, upstream: &Tensor) -> Result<()> {
        if upstream.shape != self.shape {
            return Err(AutogradError::ShapeMismatch {
                op: "backward_with",
                left: self.shape.clone(),
                right: upstream.shape.clone(),
            });
        }
        if !self.requires_grad {
            return Ok(());
        }
        let seeds: Vec<(NodeId, f64)> = self
            .nodes
            .iter()
            .copied()
            .zip(upstream.values())
            .collect();
        self.graph.backward_from(&seeds);
        Ok(())
    }

    /// Runs an independent backward pass from every element, each seeded with `1.0`.
    ///
    /// Only meaningful when every element is itself a final objective: shared ancestors
    /// accumulate across passes and an element that feeds another is reseeded when its own
    /// pass starts. Prefer [`Tensor::backward_with`].
    pub fn backward_each(&self) {
        if !self.requires_grad {
            return;
        }
        for node in self.nodes() {
            node.backward();
        }
    }

    /// Resets the gradient of every node reachable from any element.
    pub fn zero_grad(&self) {
        self.graph.zero_grad_from(&self.nodes);
    }
}

impl Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        self.map(|n| -n)
    }
}

impl Neg for Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        -&self
    }
}

impl Parameters for Tensor {
    fn parameters(&self) -> Vec<Node> {
        self.nodes()
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("values", &self.values())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}

/// Writes `values` as nested brackets following `dims`.
fn write_nested(f: &mut fmt::Formatter<'_>, dims: &[usize], values: &[f64]) -> fmt::Result {
    write!(f, "[")?;
    match dims {
        [] | [_] => {
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v}")?;
            }
        }
        [outer, inner @ ..] => {
            let chunk = values.len() / outer;
            for (i, block) in values.chunks(chunk).enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_nested(f, inner, block)?;
            }
        }
    }
    write!(f, "]")
}

impl fmt::Display for Tensor {
    /// `Tensor(shape=(2, 2), data=[[1, 2], [3, 4]], requires_grad=true)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={}, data=", self.shape)?;
        write_nested(f, self.shape.dims(), &self.values())?;
        write!(f, ", requires_grad={})", self.requires_grad)
    }
}
