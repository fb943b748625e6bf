//! softmax_vector_loss: softmax with a vector-supervised cross-entropy loss.
//!
//! A training-time loss layer for dense prediction where each example carries
//! a continuous label vector instead of a single class index. Label values are
//! distances that decay into soft targets, `exp(-temperature * distance)`, so
//! the score gradient pulls probability toward every near target at once.
//!
//! # Features
//!
//! - Composite layer normalizing scores with an owned softmax sub-layer.
//! - CPU kernels parallelized with `rayon`, plus an optional WGPU path.
//! - Parameters loaded from JSON and validated before use.
//! - A checksummed record store and an image-list converter feeding it.
//!
//! # Modules
//!
//! - [`tensors`] — Shaped buffers with paired gradients.
//! - [`layer`] — The setup / forward / backward contract.
//! - [`layers`] — [`SoftmaxLayer`](layers::SoftmaxLayer) and
//!   [`SoftmaxWithVectorLossLayer`](layers::SoftmaxWithVectorLossLayer).
//! - [`ops`] — Kernels and backend dispatch.
//! - [`config`] — Layer parameters.
//! - [`records`] — Training records on disk and their ingestion.
//!
//! # Example
//!
//! ```rust
//! use softmax_vector_loss::prelude::*;
//!
//! let mut scores = GradTensor::new(Tensor::new(vec![2, 3], vec![0.0f64; 6]));
//! let mut labels = GradTensor::new(Tensor::new(vec![2, 3], vec![0.0, 1.0, 2.0, 2.0, 1.0, 0.0]));
//!
//! let mut loss = SoftmaxWithVectorLossLayer::new(VectorLossParams::default())?;
//! loss.setup(&[&scores, &labels], &mut [])?;
//! loss.forward(&[&scores, &labels], &mut [])?;
//! let value = loss.backward(&[], true, &mut [&mut scores, &mut labels])?;
//! assert!((value - 3f64.ln()).abs() < 1e-12);
//! # Ok::<(), LayerError>(())
//! ```

pub mod approx;
pub mod backend;
pub mod config;
pub mod error;
pub mod float;
pub mod layer;
pub mod layers;
pub mod ops;
pub mod records;
pub mod tensors;

/// The types needed to drive a layer.
pub mod prelude {
    pub use crate::backend::{Backend, get_backend, set_backend};
    pub use crate::config::VectorLossParams;
    pub use crate::error::LayerError;
    pub use crate::float::Float;
    pub use crate::layer::Layer;
    pub use crate::layers::{SoftmaxLayer, SoftmaxWithVectorLossLayer};
    pub use crate::tensors::{GradTensor, Tensor, WithGrad};
}
