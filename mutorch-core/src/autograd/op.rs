//! Operation tags and their local gradient rules.
//!
//! Every non-leaf node records one [`Op`]. The backward pass looks the rule up by tag instead
//! of storing a closure per node: given the operand values, [`Op::partials`] returns the local
//! derivative of the output with respect to each operand, which the traversal scales by the
//! output's upstream gradient and adds into the operand's `grad`.

use std::fmt;

/// Primitive scalar operation that produced a node.
///
/// Subtraction, division, negation and absolute value are composites built from these
/// (`a - b = a + (-b)`, `a / b = a * b^-1`, `-a = a * -1`, `|a| = a * sign(a)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `a + b`
    Add,
    /// `a * b`
    Mul,
    /// `a ^ k`; the exponent is treated as a constant by the backward pass.
    Pow,
    /// `tanh(a)`
    Tanh,
    /// `exp(a)`
    Exp,
}

impl Op {
    /// Short tag used in diagnostics (`+`, `*`, `**`, `tanh`, `exp`).
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Mul => "*",
            Op::Pow => "**",
            Op::Tanh => "tanh",
            Op::Exp => "exp",
        }
    }

    /// Number of operands.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Op::Add | Op::Mul | Op::Pow => 2,
            Op::Tanh | Op::Exp => 1,
        }
    }

    /// Forward value from operand values.
    pub(crate) fn forward(self, operands: &[f64]) -> f64 {
        debug_assert_eq!(operands.len(), self.arity());
        match self {
            Op::Add => operands[0] + operands[1],
            Op::Mul => operands[0] * operands[1],
            Op::Pow => operands[0].powf(operands[1]),
            Op::Tanh => operands[0].tanh(),
            Op::Exp => operands[0].exp(),
        }
    }

    /// Local derivative of the output with respect to each operand.
    ///
    /// `None` means no gradient flows into that operand slot.
    pub(crate) fn partials(self, operands: &[f64]) -> [Option<f64>; 2] {
        match self {
            Op::Add => [Some(1.0), Some(1.0)],
            Op::Mul => [Some(operands[1]), Some(operands[0])],
            Op::Pow => {
                let (a, k) = (operands[0], operands[1]);
                [Some(k * a.powf(k - 1.0)), None]
            }
            Op::Tanh => {
                let t = operands[0].tanh();
                [Some(1.0 - t * t), None]
            }
            Op::Exp => [Some(operands[0].exp()), None],
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
