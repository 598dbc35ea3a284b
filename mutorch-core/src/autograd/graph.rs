//! Arena-backed computation graph and the backward/zero-grad traversals.
//!
//! Nodes live in a `Vec` owned by the graph and are addressed by [`NodeId`]. Children are
//! stored as id lists, so the graph is a DAG of integer edges: an operation can only reference
//! nodes that already exist, which makes every child id smaller than its parent's.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::impls::node::Node;
use super::op::Op;
use super::shape::FlattenOrder;
use crate::config::{Config, MAX_ARENA_CAPACITY};

/// Stable handle of a node inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-node state stored in the arena.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) value: f64,
    /// `None` when the node does not track gradients.
    pub(crate) grad: Option<f64>,
    pub(crate) name: String,
    pub(crate) op: Option<Op>,
    pub(crate) children: Vec<NodeId>,
}

impl NodeData {
    pub(crate) fn leaf(value: f64, requires_grad: bool) -> Self {
        Self {
            value,
            grad: requires_grad.then_some(0.0),
            name: String::new(),
            op: None,
            children: Vec::new(),
        }
    }
}

struct Arena {
    nodes: Vec<NodeData>,
    default_requires_grad: bool,
    flatten_order: FlattenOrder,
}

/// Shared handle to a computation graph.
///
/// Cloning the handle is cheap and every clone sees the same arena. Nodes are never removed:
/// the arena lives as long as any [`Graph`], [`Node`] or [`Tensor`](super::Tensor) refers to it.
#[derive(Clone)]
pub struct Graph(Rc<RefCell<Arena>>);

impl Graph {
    /// Creates an empty graph with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Creates an empty graph, reserving `arena_capacity` nodes and adopting the configured
    /// default `requires_grad` and flatten order.
    ///
    /// The reservation is capped at [`MAX_ARENA_CAPACITY`] whether or not the config was
    /// validated; the arena still grows past it on demand.
    #[must_use]
    pub fn with_config(config: &Config) -> Self {
        let capacity = config.arena_capacity.min(MAX_ARENA_CAPACITY);
        debug!(
            capacity,
            flatten_order = ?config.flatten_order,
            "creating graph"
        );
        Graph(Rc::new(RefCell::new(Arena {
            nodes: Vec::with_capacity(capacity),
            default_requires_grad: config.default_requires_grad,
            flatten_order: config.flatten_order,
        })))
    }

    /// Creates a leaf that tracks gradients.
    #[must_use]
    pub fn leaf(&self, value: f64) -> Node {
        self.leaf_with(value, true)
    }

    /// Creates a leaf that never receives gradients.
    #[must_use]
    pub fn constant(&self, value: f64) -> Node {
        self.leaf_with(value, false)
    }

    /// Creates a leaf with an explicit `requires_grad` flag.
    #[must_use]
    pub fn leaf_with(&self, value: f64, requires_grad: bool) -> Node {
        let id = self.push(NodeData::leaf(value, requires_grad));
        Node::from_parts(self.clone(), id)
    }

    /// Number of nodes allocated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().nodes.len()
    }

    /// True if no node has been allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().nodes.is_empty()
    }

    /// True if both handles share one arena.
    #[must_use]
    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// `requires_grad` used by [`Tensor::new`](super::Tensor::new).
    #[must_use]
    pub fn default_requires_grad(&self) -> bool {
        self.0.borrow().default_requires_grad
    }

    /// Order used by [`Tensor::flatten`](super::Tensor::flatten).
    #[must_use]
    pub fn flatten_order(&self) -> FlattenOrder {
        self.0.borrow().flatten_order
    }

    pub(crate) fn push(&self, data: NodeData) -> NodeId {
        let mut arena = self.0.borrow_mut();
        let id = NodeId(arena.nodes.len());
        arena.nodes.push(data);
        id
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&NodeData) -> R) -> R {
        f(&self.0.borrow().nodes[id.0])
    }

    pub(crate) fn with_node_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> R {
        f(&mut self.0.borrow_mut().nodes[id.0])
    }

    pub(crate) fn value(&self, id: NodeId) -> f64 {
        self.with_node(id, |n| n.value)
    }

    pub(crate) fn grad(&self, id: NodeId) -> Option<f64> {
        self.with_node(id, |n| n.grad)
    }

    /// Nodes reachable from `roots` in reverse topological order: every node appears before
    /// all of its children.
    ///
    /// Iterative depth-first search that records each node after all of its children
    /// (post-order), deduplicated by a visited bitmap; the result is that order reversed.
    /// Children always have smaller ids than their parents, so the bitmap only spans ids up to
    /// the largest root and nodes allocated later never cost anything.
    pub(crate) fn reverse_topological(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let arena = self.0.borrow();
        let span = roots.iter().map(|id| id.0 + 1).max().unwrap_or(0);
        let mut visited = vec![false; span];
        let mut post_order = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = roots.iter().rev().map(|&id| (id, false)).collect();

        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                post_order.push(id);
                continue;
            }
            if visited[id.0] {
                continue;
            }
            visited[id.0] = true;
            stack.push((id, true));
            for &child in arena.nodes[id.0].children.iter().rev() {
                if !visited[child.0] {
                    stack.push((child, false));
                }
            }
        }

        post_order.reverse();
        post_order
    }

    /// Seeds each root with its upstream gradient and fires every reachable node's local rule
    /// once, consumers before producers.
    ///
    /// A root's `grad` is overwritten with the sum of its seeds; every other node accumulates.
    pub(crate) fn backward_from(&self, seeds: &[(NodeId, f64)]) {
        let roots: Vec<NodeId> = seeds.iter().map(|&(id, _)| id).collect();
        let order = self.reverse_topological(&roots);
        debug!(seeds = seeds.len(), reachable = order.len(), "backward pass");

        let mut arena = self.0.borrow_mut();
        let nodes = &mut arena.nodes;
        for &(id, _) in seeds {
            if let Some(g) = nodes[id.0].grad.as_mut() {
                *g = 0.0;
            }
        }
        for &(id, upstream) in seeds {
            if let Some(g) = nodes[id.0].grad.as_mut() {
                *g += upstream;
            }
        }

        let mut operands = Vec::with_capacity(2);
        for id in order {
            let node = &nodes[id.0];
            let (Some(op), Some(upstream)) = (node.op, node.grad) else {
                continue;
            };
            operands.clear();
            operands.extend(node.children.iter().map(|c| nodes[c.0].value));
            let children = [node.children.first().copied(), node.children.get(1).copied()];

            for (child, partial) in children.into_iter().zip(op.partials(&operands)) {
                if let (Some(child), Some(partial)) = (child, partial) {
                    if let Some(g) = nodes[child.0].grad.as_mut() {
                        *g += partial * upstream;
                    }
                }
            }
        }
    }

    /// Resets `grad` to `0.0` on every tracked node reachable from `roots`.
    pub(crate) fn zero_grad_from(&self, roots: &[NodeId]) {
        let order = self.reverse_topological(roots);
        debug!(roots = roots.len(), reachable = order.len(), "zero grad");

        let mut arena = self.0.borrow_mut();
        for id in order {
            if let Some(g) = arena.nodes[id.0].grad.as_mut() {
                *g = 0.0;
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.0.borrow();
        f.debug_struct("Graph")
            .field("num_nodes", &arena.nodes.len())
            .field("default_requires_grad", &arena.default_requires_grad)
            .field("flatten_order", &arena.flatten_order)
            .finish()
    }
}
