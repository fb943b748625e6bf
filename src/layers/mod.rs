//! Layer implementations.
//!
//! - [`SoftmaxLayer`] — normalizes scores into per-example distributions
//! - [`SoftmaxWithVectorLossLayer`] — softmax plus the vector-supervised loss

mod softmax;
mod vector_loss;

pub use self::softmax::SoftmaxLayer;
pub use self::vector_loss::SoftmaxWithVectorLossLayer;
