//! # Operation Dispatch Layer
//!
//! This module defines the numeric routines behind the layers and dispatches
//! the loss backward pass across compute backends.
//!
//! ## Submodules
//!
//! - [`formula`] — The elementwise loss and gradient formulas, shared by every backend
//! - [`cpu`] — Multi-threaded CPU operations (default, and the fallback of every backend)
//! - [`wgpu`] *(opt-in)* — GPU compute shader pipeline using `wgpu`
//! - [`cuda`] *(planned)* — CUDA backend for NVIDIA (dispatches to WGPU for now)
//! - [`dispatch`] — Backend selection with transparent CPU fallback
//!
//! ## Extending the Backend
//!
//! To accelerate another operation:
//!
//! 1. Express its elementwise math in [`formula`]
//! 2. Implement it in one or more backends (e.g. `cpu::my_op`, `wgpu::my_op`)
//! 3. Add it to the `dispatch` module for unified access
//!
//! ## Feature Flags
//!
//! - `wgpu` — Enables the `wgpu` (WebGPU) backend
//! - `cuda` — Enables the placeholder CUDA module (dispatches to WGPU)

pub mod formula;

// dispatch layer...
pub mod dispatch;

// ... across these backends:
pub mod cpu;

#[cfg(feature = "wgpu")]
pub mod wgpu;

#[cfg(feature = "cuda")]
pub mod cuda;
