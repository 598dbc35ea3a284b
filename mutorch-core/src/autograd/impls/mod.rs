//! Concrete graph handles: scalar [`node::Node`] and rank 1–4 [`tensor::Tensor`].

pub mod node;
pub mod tensor;
