//! Operation Dispatch Layer
//!
//! This module selects the backend (CPU, WGPU, CUDA) that runs the vector
//! loss backward pass.
//!
//! Each function attempts backend-specific implementations in priority order:
//! 1. `Cuda` (if enabled)
//! 2. `Wgpu` (if enabled)
//! 3. Falls back to `Cpu`
//!
//! An accelerated backend that is not compiled in, has no adapter, or fails
//! mid-dispatch is not an error: the call falls back to the CPU path and
//! returns the same result within floating point tolerance.
//!
//! # Example
//! ```rust
//! use softmax_vector_loss::backend::Backend;
//! use softmax_vector_loss::ops::dispatch::vector_loss_backward_on;
//!
//! let prob = [0.5f32, 0.5];
//! let labels = [0.0f32, 1.0];
//! let mut grad = [0.0f32; 2];
//! let loss = vector_loss_backward_on(Backend::Wgpu, &prob, &labels, 1, 1.0, &mut grad);
//! assert!(loss.is_finite());
//! ```

use crate::backend::{Backend, get_backend};
use crate::float::Float;

/// Dispatches the vector loss backward pass to the global default backend.
///
/// See [`vector_loss_backward_on`].
pub fn vector_loss_backward<T: Float>(
    prob: &[T],
    labels: &[T],
    num: usize,
    temperature: T,
    grad: &mut [T],
) -> T {
    vector_loss_backward_on(get_backend(), prob, labels, num, temperature, grad)
}

/// Writes the score gradient of `num` examples into `grad` and returns the
/// batch-averaged loss, on the given backend.
///
/// `prob`, `labels` and `grad` must have equal lengths divisible by `num`;
/// the layer checks this before dispatching.
///
/// # Behavior
/// Attempts CUDA → WGPU → CPU, depending on `backend` and enabled features.
pub fn vector_loss_backward_on<T: Float>(
    backend: Backend,
    prob: &[T],
    labels: &[T],
    num: usize,
    temperature: T,
    grad: &mut [T],
) -> T {
    match backend {
        Backend::Cuda => {
            #[cfg(feature = "cuda")]
            {
                if let Some(loss) =
                    super::cuda::cuda_vector_loss_backward(prob, labels, num, temperature, grad)
                {
                    return loss;
                }
            }
        }
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if let Some(loss) =
                    super::wgpu::wgpu_vector_loss_backward(prob, labels, num, temperature, grad)
                {
                    return loss;
                }
            }
        }
        Backend::Cpu => {}
    }

    if backend.is_accelerated() {
        tracing::debug!(?backend, "no accelerated vector loss kernel, using the CPU path");
    }

    super::cpu::vector_loss_backward(prob, labels, num, temperature, grad)
}
