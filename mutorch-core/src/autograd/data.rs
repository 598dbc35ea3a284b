//! Conversions from nested Rust data into tensor contents.
//!
//! [`TensorData`] is implemented for scalars, `Vec`s and fixed-size arrays nested up to four
//! deep, over every [`Element`] type. Numbers become fresh leaves; existing [`Node`]s are used
//! by reference. A depth-1 sequence becomes a `(1, n)` row, matching how a flat list of
//! weights or inputs is laid out elsewhere in the crate.

use crate::autograd::error::{AutogradError, Result};
use crate::autograd::graph::{Graph, NodeId};
use crate::autograd::impls::node::Node;
use crate::autograd::shape::Shape;

/// A value that can occupy one tensor position.
pub trait Element {
    /// Resolves to a node id inside `graph`, allocating a leaf for numbers.
    ///
    /// # Errors
    ///
    /// [`AutogradError::ForeignNode`] if a node belongs to another graph.
    fn into_node_id(self, graph: &Graph, requires_grad: bool) -> Result<NodeId>;
}

macro_rules! numeric_element {
    ($($ty:ty),*) => {$(
        impl Element for $ty {
            fn into_node_id(self, graph: &Graph, requires_grad: bool) -> Result<NodeId> {
                Ok(graph.leaf_with(f64::from(self), requires_grad).id())
            }
        }
    )*};
}

numeric_element!(f64, f32, i32);

impl Element for &Node {
    fn into_node_id(self, graph: &Graph, _requires_grad: bool) -> Result<NodeId> {
        if self.graph().ptr_eq(graph) {
            Ok(self.id())
        } else {
            Err(AutogradError::ForeignNode)
        }
    }
}

impl Element for Node {
    fn into_node_id(self, graph: &Graph, requires_grad: bool) -> Result<NodeId> {
        (&self).into_node_id(graph, requires_grad)
    }
}

/// Nested data that can be turned into a tensor.
pub trait TensorData {
    /// Validates rectangularity and rank, then resolves every element in row-major order.
    ///
    /// # Errors
    ///
    /// [`AutogradError::Ragged`], [`AutogradError::EmptyAxis`],
    /// [`AutogradError::UnsupportedRank`] or [`AutogradError::ForeignNode`].
    fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)>;
}

/// Extents and row-major elements of a nested block.
type Block<E> = (Vec<usize>, Vec<E>);

fn block1<E>(items: Vec<E>) -> Result<Block<E>> {
    Ok((vec![items.len()], items))
}

/// Concatenates equally shaped sub-blocks along a new leading axis.
fn stack_blocks<E>(blocks: impl ExactSizeIterator<Item = Result<Block<E>>>) -> Result<Block<E>> {
    let count = blocks.len();
    let mut dims: Option<Vec<usize>> = None;
    let mut elems = Vec::new();
    for block in blocks {
        let (sub, items) = block?;
        match &dims {
            None => dims = Some(sub),
            Some(expected) => {
                if let Some(axis) = expected.iter().zip(&sub).position(|(a, b)| a != b) {
                    return Err(AutogradError::Ragged {
                        axis: axis + 1,
                        expected: expected[axis],
                        actual: sub[axis],
                    });
                }
            }
        }
        elems.extend(items);
    }
    let Some(sub) = dims else {
        return Err(AutogradError::EmptyAxis { axis: 0 });
    };
    let mut out = Vec::with_capacity(sub.len() + 1);
    out.push(count);
    out.extend(sub);
    Ok((out, elems))
}

fn block2<E>(rows: Vec<Vec<E>>) -> Result<Block<E>> {
    stack_blocks(rows.into_iter().map(block1))
}

fn block3<E>(planes: Vec<Vec<Vec<E>>>) -> Result<Block<E>> {
    stack_blocks(planes.into_iter().map(block2))
}

fn block4<E>(volumes: Vec<Vec<Vec<Vec<E>>>>) -> Result<Block<E>> {
    stack_blocks(volumes.into_iter().map(block3))
}

/// Validates the shape before resolving any element, so rejected input allocates nothing.
/// Numeric elements cannot fail once the shape is valid; node elements only fail the ownership
/// check, which allocates nothing either.
fn resolve<E: Element>(
    graph: &Graph,
    requires_grad: bool,
    (dims, elems): Block<E>,
) -> Result<(Shape, Vec<NodeId>)> {
    let shape = Shape::new(&dims)?;
    let ids = elems
        .into_iter()
        .map(|e| e.into_node_id(graph, requires_grad))
        .collect::<Result<Vec<_>>>()?;
    Ok((shape, ids))
}

macro_rules! tensor_data {
    ($($elem:ty),*) => {$(
        impl TensorData for $elem {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                resolve(graph, requires_grad, (vec![1, 1], vec![self]))
            }
        }

        impl TensorData for Vec<$elem> {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                if self.is_empty() {
                    return Err(AutogradError::EmptyAxis { axis: 1 });
                }
                resolve(graph, requires_grad, (vec![1, self.len()], self))
            }
        }

        impl TensorData for Vec<Vec<$elem>> {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                resolve(graph, requires_grad, block2(self)?)
            }
        }

        impl TensorData for Vec<Vec<Vec<$elem>>> {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                resolve(graph, requires_grad, block3(self)?)
            }
        }

        impl TensorData for Vec<Vec<Vec<Vec<$elem>>>> {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                resolve(graph, requires_grad, block4(self)?)
            }
        }

        impl<const N: usize> TensorData for [$elem; N] {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                Vec::from(self).into_parts(graph, requires_grad)
            }
        }

        impl<const R: usize, const C: usize> TensorData for [[$elem; C]; R] {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                self.into_iter()
                    .map(Vec::from)
                    .collect::<Vec<_>>()
                    .into_parts(graph, requires_grad)
            }
        }

        impl<const P: usize, const R: usize, const C: usize> TensorData for [[[$elem; C]; R]; P] {
            fn into_parts(self, graph: &Graph, requires_grad: bool) -> Result<(Shape, Vec<NodeId>)> {
                self.into_iter()
                    .map(|plane| plane.into_iter().map(Vec::from).collect::<Vec<_>>())
                    .collect::<Vec<_>>()
                    .into_parts(graph, requires_grad)
            }
        }
    )*};
}

tensor_data!(f64, f32, i32, Node, &Node);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_vec_becomes_a_row() {
        let g = Graph::new();
        let (shape, ids) = vec![1.0_f64, 2.0, 3.0].into_parts(&g, true).unwrap();
        assert_eq!(shape.dims(), &[1, 3]);
        assert_eq!(ids.len(), 3);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn scalar_becomes_one_by_one() {
        let g = Graph::new();
        let (shape, _) = 4.0_f64.into_parts(&g, true).unwrap();
        assert!(shape.is_scalar());
    }

    #[test]
    fn nested_arrays_are_row_major() {
        let g = Graph::new();
        let (shape, ids) = [[[1_i32, 2], [3, 4], [5, 6]], [[7, 8], [9, 10], [11, 12]]]
            .into_parts(&g, true)
            .unwrap();
        assert_eq!(shape.dims(), &[2, 3, 2]);
        let values: Vec<f64> = ids.iter().map(|&id| g.value(id)).collect();
        assert_eq!(values, (1..=12).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn ragged_input_is_rejected_before_allocation() {
        let g = Graph::new();
        let err = vec![vec![1.0_f64, 2.0], vec![3.0]].into_parts(&g, true).unwrap_err();
        assert_eq!(
            err,
            AutogradError::Ragged {
                axis: 1,
                expected: 2,
                actual: 1
            }
        );
        assert!(g.is_empty());
    }

    #[test]
    fn ragged_inner_axis_reports_its_depth() {
        let g = Graph::new();
        let err = vec![vec![vec![1.0_f64, 2.0]], vec![vec![3.0]]]
            .into_parts(&g, true)
            .unwrap_err();
        assert!(matches!(err, AutogradError::Ragged { axis: 2, .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        let g = Graph::new();
        assert_eq!(
            Vec::<f64>::new().into_parts(&g, true).unwrap_err(),
            AutogradError::EmptyAxis { axis: 1 }
        );
        assert_eq!(
            Vec::<Vec<f64>>::new().into_parts(&g, true).unwrap_err(),
            AutogradError::EmptyAxis { axis: 0 }
        );
        assert_eq!(
            vec![Vec::<f64>::new()].into_parts(&g, true).unwrap_err(),
            AutogradError::EmptyAxis { axis: 1 }
        );
    }

    #[test]
    fn nodes_are_used_by_reference() {
        let g = Graph::new();
        let a = g.leaf(1.0);
        let b = g.leaf(2.0);
        let (shape, ids) = vec![vec![&a], vec![&b]].into_parts(&g, true).unwrap();
        assert_eq!(shape.dims(), &[2, 1]);
        assert_eq!(ids, vec![a.id(), b.id()]);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn nodes_from_other_graphs_are_rejected() {
        let g = Graph::new();
        let other = Graph::new();
        let stray = other.leaf(1.0);
        assert_eq!(
            vec![stray].into_parts(&g, true).unwrap_err(),
            AutogradError::ForeignNode
        );
    }

    #[test]
    fn requires_grad_flag_reaches_fresh_leaves() {
        let g = Graph::new();
        let (_, ids) = vec![1.0_f64, 2.0].into_parts(&g, false).unwrap();
        assert!(ids.iter().all(|&id| g.grad(id).is_none()));
    }
}
