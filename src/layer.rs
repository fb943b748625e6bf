//! The lifecycle shared by every layer.
//!
//! A graph runtime drives a layer through a fixed order:
//!
//! 1. [`Layer::setup`] once, when the graph is built,
//! 2. then per training step [`Layer::forward`] followed by [`Layer::backward`],
//!    both on the same bottom tensors.
//!
//! "Bottom" tensors are a layer's inputs and "top" tensors its outputs. The
//! runtime owns all of them; a layer only reads and writes through the
//! references it is given.

use crate::error::LayerError;
use crate::float::Float;
use crate::tensors::GradTensor;

/// A node of the computation graph.
pub trait Layer<T: Float> {
    /// Human-readable layer type, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Checks the bottom/top counts and shapes and prepares internal state.
    ///
    /// # Errors
    /// A [`LayerError`] describing the malformed definition.
    fn setup(
        &mut self,
        bottom: &[&GradTensor<T>],
        top: &mut [&mut GradTensor<T>],
    ) -> Result<(), LayerError>;

    /// Computes the top values from the bottom values.
    ///
    /// # Errors
    /// A [`LayerError`] if the layer was not set up or the buffers changed shape.
    fn forward(
        &mut self,
        bottom: &[&GradTensor<T>],
        top: &mut [&mut GradTensor<T>],
    ) -> Result<(), LayerError>;

    /// Writes bottom gradients from the top gradients and returns the loss
    /// contributed by this layer (zero for non-loss layers).
    ///
    /// # Errors
    /// A [`LayerError`] if the layer was not run forward or the buffers disagree in size.
    fn backward(
        &mut self,
        top: &[&GradTensor<T>],
        propagate_down: bool,
        bottom: &mut [&mut GradTensor<T>],
    ) -> Result<T, LayerError>;
}

/// Fails with [`LayerError::BottomCount`] unless exactly `expected` bottoms were given.
pub(crate) fn check_bottom_count(
    layer: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), LayerError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LayerError::BottomCount {
            layer,
            expected,
            actual,
        })
    }
}

/// Fails with [`LayerError::TopCount`] unless exactly `expected` tops were given.
pub(crate) fn check_top_count(
    layer: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), LayerError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LayerError::TopCount {
            layer,
            expected,
            actual,
        })
    }
}

/// Fails with [`LayerError::ShapeMismatch`] unless the two shapes are identical.
///
/// Equal element counts are not enough: `[2, 3]` and `[3, 2]` split the same
/// data into different examples.
pub(crate) fn check_shape(
    what: &'static str,
    expected: &[usize],
    actual: &[usize],
) -> Result<(), LayerError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LayerError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Fails with [`LayerError::CountMismatch`] unless the two counts agree.
pub(crate) fn check_count(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), LayerError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LayerError::CountMismatch {
            what,
            expected,
            actual,
        })
    }
}
