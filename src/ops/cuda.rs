//! Nvidia-only CUDA acceleration.
//!
//! There is no native kernel yet; every entry point routes to WGPU, which
//! itself falls back to the CPU when no adapter is present.

use crate::float::Float;

/// Computes the vector loss backward pass, falling back to WGPU.
pub fn cuda_vector_loss_backward<T: Float>(
    prob: &[T],
    labels: &[T],
    num: usize,
    temperature: T,
    grad: &mut [T],
) -> Option<T> {
    // TODO: implement using the `cust` crate
    super::wgpu::wgpu_vector_loss_backward(prob, labels, num, temperature, grad) // wgpu fallback
}
