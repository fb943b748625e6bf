//! Backend selection module.
//!
//! This module defines the execution routes available to the loss layer's
//! backward pass and provides functions to set and get the process-wide
//! default.
//!
//! # Supported Backends
//!
//! - `Cpu` — Pure Rust reference path on rayon threads (default).
//! - `Wgpu` — GPU-accelerated elementwise kernel using `wgpu` (if compiled in).
//! - `Cuda` — Placeholder that currently routes to `Wgpu`.
//!
//! The backend is stored globally using an `AtomicU8`. A layer may pin its own
//! backend instead, see
//! [`SoftmaxWithVectorLossLayer::with_backend`](crate::layers::SoftmaxWithVectorLossLayer::with_backend).
//!
//! Selecting an accelerated backend is never an error: when the kernel is not
//! compiled in, or no adapter is present, the dispatch layer falls back to the
//! CPU path.

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};
use serde::{Deserialize, Serialize};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Backend {
    /// Pure CPU-based backend (default).
    #[default]
    Cpu = 0,
    /// GPU-accelerated backend using `wgpu`.
    Wgpu = 1,
    /// Placeholder for future CUDA support.
    Cuda = 2,
}

impl Backend {
    /// Whether this backend may run on an accelerator.
    pub const fn is_accelerated(self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            2 => Ok(Self::Cuda),
            _ => Err(()),
        }
    }
}

/// Internal global state for the active backend.
///
/// Relaxed ordering is enough: the value is a standalone flag that guards no
/// other memory.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the default backend used by layers that did not pin one.
///
/// # Example
/// ```
/// use softmax_vector_loss::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Wgpu);
/// assert_eq!(get_backend(), Backend::Wgpu);
/// set_backend(Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Relaxed);
}

/// Returns the currently active default backend.
///
/// If the stored value is invalid, defaults to `Backend::Cpu`.
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Relaxed)).unwrap_or(Backend::Cpu)
}
