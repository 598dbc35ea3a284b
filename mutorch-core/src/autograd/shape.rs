//! Tensor shapes, broadcast classification and flatten ordering.

use std::fmt;
use std::str::FromStr;

use super::error::{AutogradError, Result};

/// Highest supported tensor rank.
pub const MAX_RANK: usize = 4;

/// Extents of a rank 1–4 tensor. Every extent is positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Builds a shape, rejecting ranks outside `1..=4`, zero-length axes and element counts
    /// that do not fit in `usize`.
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.is_empty() || dims.len() > MAX_RANK {
            return Err(AutogradError::UnsupportedRank { rank: dims.len() });
        }
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(AutogradError::EmptyAxis { axis });
        }
        if dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
            return Err(AutogradError::TooLarge {
                dims: dims.to_vec(),
            });
        }
        Ok(Shape(dims.to_vec()))
    }

    /// The `(1, 1)` shape of a single scalar.
    #[must_use]
    pub fn scalar() -> Self {
        Shape(vec![1, 1])
    }

    /// The `(1, n)` shape of a row vector.
    #[must_use]
    pub(crate) fn row(n: usize) -> Self {
        Shape(vec![1, n])
    }

    /// Extent of each axis.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. Cannot overflow: [`Shape::new`] checks the product.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// True for `(1, 1)`.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.0 == [1, 1]
    }

    /// True for `(1, n)`.
    #[must_use]
    pub fn is_row(&self, n: usize) -> bool {
        self.0 == [1, n]
    }

    /// Row-major offset of a multi-index, or `None` if it falls outside the shape.
    #[must_use]
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.rank() {
            return None;
        }
        index
            .iter()
            .zip(&self.0)
            .try_fold(0, |acc, (&i, &d)| (i < d).then_some(acc * d + i))
    }

    /// Row-major offsets listed in the requested linear order.
    pub(crate) fn permutation(&self, order: FlattenOrder) -> Vec<usize> {
        match order {
            FlattenOrder::RowMajor => (0..self.numel()).collect(),
            FlattenOrder::AxisReversed => {
                let mut index = vec![0; self.rank()];
                (0..self.numel())
                    .map(|mut k| {
                        for (slot, &d) in index.iter_mut().zip(&self.0) {
                            *slot = k % d;
                            k /= d;
                        }
                        index
                            .iter()
                            .zip(&self.0)
                            .fold(0, |acc, (&i, &d)| acc * d + i)
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

/// Linear order used by `flatten()` and `items()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlattenOrder {
    /// Conventional order: last axis varies fastest.
    #[default]
    RowMajor,
    /// First axis varies fastest, last axis slowest.
    AxisReversed,
}

impl FromStr for FlattenOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row-major" | "row_major" | "rowmajor" => Ok(FlattenOrder::RowMajor),
            "axis-reversed" | "axis_reversed" | "axisreversed" => Ok(FlattenOrder::AxisReversed),
            other => Err(format!(
                "unknown flatten order {other:?} (expected \"row-major\" or \"axis-reversed\")"
            )),
        }
    }
}

/// How a right operand lines up with a left operand in an elementwise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Broadcast {
    /// Identical shapes.
    Elementwise,
    /// Right is `(1, left[0])`: one scalar per slice along the left's first axis.
    PerRow,
    /// Right is `(1, 1)`.
    Scalar,
}

impl Broadcast {
    /// Classifies the operand pair, or fails with a shape mismatch.
    ///
    /// `allow_elementwise` is false for `pow`, which only accepts per-row and scalar exponents.
    pub(crate) fn classify(
        op: &'static str,
        left: &Shape,
        right: &Shape,
        allow_elementwise: bool,
    ) -> Result<Self> {
        if allow_elementwise && left == right {
            Ok(Broadcast::Elementwise)
        } else if right.is_scalar() {
            Ok(Broadcast::Scalar)
        } else if right.is_row(left.dims()[0]) {
            Ok(Broadcast::PerRow)
        } else {
            Err(AutogradError::ShapeMismatch {
                op,
                left: left.clone(),
                right: right.clone(),
            })
        }
    }

    /// Replicates right-operand entries into a dense row-major list matching `left`.
    ///
    /// The replica holds references to the same entries, so every position that reads a
    /// broadcast scalar feeds its gradient back into that one entry.
    pub(crate) fn expand<T: Clone>(self, left: &Shape, right: &[T]) -> Vec<T> {
        match self {
            Broadcast::Elementwise => right.to_vec(),
            Broadcast::Scalar => vec![right[0].clone(); left.numel()],
            Broadcast::PerRow => {
                let slice = left.numel() / left.dims()[0];
                right
                    .iter()
                    .flat_map(|r| std::iter::repeat_n(r.clone(), slice))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_bad_ranks_and_empty_axes() {
        assert_eq!(
            Shape::new(&[]),
            Err(AutogradError::UnsupportedRank { rank: 0 })
        );
        assert_eq!(
            Shape::new(&[1, 2, 3, 4, 5]),
            Err(AutogradError::UnsupportedRank { rank: 5 })
        );
        assert_eq!(
            Shape::new(&[2, 0, 3]),
            Err(AutogradError::EmptyAxis { axis: 1 })
        );
        assert_eq!(Shape::new(&[2, 3, 4, 5]).unwrap().numel(), 120);
    }

    #[test]
    fn new_rejects_element_counts_past_usize() {
        let huge = usize::MAX / 2 + 1;
        assert_eq!(
            Shape::new(&[huge, 2]),
            Err(AutogradError::TooLarge {
                dims: vec![huge, 2]
            })
        );
        assert_eq!(Shape::new(&[usize::MAX, 1]).unwrap().numel(), usize::MAX);
    }

    #[test]
    fn offset_is_row_major() {
        let s = Shape::new(&[2, 3, 4]).unwrap();
        assert_eq!(s.offset(&[0, 0, 0]), Some(0));
        assert_eq!(s.offset(&[1, 2, 3]), Some(23));
        assert_eq!(s.offset(&[0, 1, 0]), Some(4));
        assert_eq!(s.offset(&[2, 0, 0]), None);
        assert_eq!(s.offset(&[0, 0]), None);
    }

    #[test]
    fn axis_reversed_permutation_varies_first_axis_fastest() {
        let s = Shape::new(&[2, 3]).unwrap();
        // (0,0) (1,0) (0,1) (1,1) (0,2) (1,2)
        assert_eq!(s.permutation(FlattenOrder::AxisReversed), vec![0, 3, 1, 4, 2, 5]);
        assert_eq!(s.permutation(FlattenOrder::RowMajor), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn display_formats_like_a_tuple() {
        assert_eq!(Shape::new(&[2, 3]).unwrap().to_string(), "(2, 3)");
        assert_eq!(Shape::new(&[7]).unwrap().to_string(), "(7,)");
    }

    #[test]
    fn classify_follows_broadcast_policy() {
        let left = Shape::new(&[2, 3]).unwrap();
        let same = left.clone();
        let per_row = Shape::new(&[1, 2]).unwrap();
        let transposed = Shape::new(&[3, 2]).unwrap();

        assert_eq!(
            Broadcast::classify("add", &left, &same, true),
            Ok(Broadcast::Elementwise)
        );
        assert_eq!(
            Broadcast::classify("add", &left, &Shape::scalar(), true),
            Ok(Broadcast::Scalar)
        );
        assert_eq!(
            Broadcast::classify("add", &left, &per_row, true),
            Ok(Broadcast::PerRow)
        );
        assert!(matches!(
            Broadcast::classify("add", &left, &transposed, true),
            Err(AutogradError::ShapeMismatch { op: "add", .. })
        ));
        assert!(Broadcast::classify("pow", &left, &same, false).is_err());
    }

    #[test]
    fn expand_per_row_repeats_each_entry_across_its_slice() {
        let left = Shape::new(&[2, 3]).unwrap();
        assert_eq!(
            Broadcast::PerRow.expand(&left, &[10, 20]),
            vec![10, 10, 10, 20, 20, 20]
        );
        assert_eq!(Broadcast::Scalar.expand(&left, &[5]), vec![5; 6]);
    }

    #[test]
    fn flatten_order_parses_from_str() {
        assert_eq!("row-major".parse::<FlattenOrder>(), Ok(FlattenOrder::RowMajor));
        assert_eq!(
            " Axis_Reversed ".parse::<FlattenOrder>(),
            Ok(FlattenOrder::AxisReversed)
        );
        assert!("diagonal".parse::<FlattenOrder>().is_err());
    }
}
