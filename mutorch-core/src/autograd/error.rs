//! Autograd errors.
//!
//! Every fallible tensor operation returns [`AutogradError`]. Failures are raised before any
//! node is allocated, so a failed call never leaves a partially built result in the graph and
//! never touches an existing node's `value` or `grad`.

use thiserror::Error;

use super::shape::Shape;

/// Convenience alias for results produced by the autograd module.
pub type Result<T> = std::result::Result<T, AutogradError>;

/// Errors produced when building or combining tensors.
///
/// # Variants
///
/// - **ShapeMismatch**: operand shapes satisfy none of the permitted broadcast relations
///   (identical, `(1, left[0])`, or `(1, 1)`), or an upstream gradient does not match.
/// - **UnsupportedRank**: a shape with zero or more than four axes.
/// - **TooLarge**: a shape whose element count overflows `usize`.
/// - **RankReduction**: a reduction that is only defined for a specific rank (`mean` on rank ≠ 2).
/// - **NotScalar**: `item()` on a tensor whose shape is not `(1, 1)`.
/// - **Ragged** / **EmptyAxis** / **LengthMismatch**: nested or flat input data that cannot
///   form a rectangular tensor.
/// - **IndexOutOfBounds**: element lookup outside the shape.
/// - **ForeignNode**: a node or tensor owned by a different [`Graph`](super::Graph).
/// - **UndefinedGradient**: an operation whose local derivative does not exist at the input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutogradError {
    /// Operand shapes cannot be combined.
    #[error("{op}: shape mismatch between {left} and {right}")]
    ShapeMismatch {
        /// Operation that rejected the shapes.
        op: &'static str,
        /// Left operand shape.
        left: Shape,
        /// Right operand shape.
        right: Shape,
    },

    /// Tensors must have between one and four axes.
    #[error("rank {rank} is not supported (expected 1 to 4 axes)")]
    UnsupportedRank {
        /// Requested rank.
        rank: usize,
    },

    /// The reduction is not defined for this rank.
    #[error("{op} is only defined for rank-2 tensors, got rank {rank}")]
    RankReduction {
        /// Reduction name.
        op: &'static str,
        /// Rank of the operand.
        rank: usize,
    },

    /// `item()` requires a `(1, 1)` tensor.
    #[error("expected a (1, 1) tensor, got {shape}")]
    NotScalar {
        /// Actual shape.
        shape: Shape,
    },

    /// Nested input is not rectangular.
    #[error("ragged input along axis {axis}: expected length {expected}, got {actual}")]
    Ragged {
        /// Axis on which the lengths disagree.
        axis: usize,
        /// Length established by the first entry.
        expected: usize,
        /// Offending length.
        actual: usize,
    },

    /// The element count of the requested shape does not fit in `usize`.
    #[error("shape {dims:?} has more elements than can be addressed")]
    TooLarge {
        /// Requested extents.
        dims: Vec<usize>,
    },

    /// Every axis must have a positive extent.
    #[error("axis {axis} has zero length")]
    EmptyAxis {
        /// Axis with zero extent.
        axis: usize,
    },

    /// Flat input length does not match the requested shape.
    #[error("shape {shape} holds {} elements, got {actual}", .shape.numel())]
    LengthMismatch {
        /// Requested shape.
        shape: Shape,
        /// Number of values supplied.
        actual: usize,
    },

    /// Index outside the tensor's shape.
    #[error("index {index:?} is out of bounds for shape {shape}")]
    IndexOutOfBounds {
        /// Requested multi-index.
        index: Vec<usize>,
        /// Tensor shape.
        shape: Shape,
    },

    /// Operand belongs to another graph.
    #[error("operand belongs to a different graph")]
    ForeignNode,

    /// The local derivative is undefined at this input.
    #[error("{op}: gradient is undefined at {value}")]
    UndefinedGradient {
        /// Operation name.
        op: &'static str,
        /// Input value.
        value: f64,
    },
}
