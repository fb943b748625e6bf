//! Core tensor data structures.
//!
//! # Tensor Buffers
//!
//! The loss layer does not need a general tensor library. It needs a
//! row-major buffer with a shape, and a paired gradient region of the same
//! shape. This module provides exactly that:
//!
//! - [`Tensor<T>`]: shape plus flat row-major data
//! - [`WithGrad<T>`]: a value paired with its gradient
//! - [`GradTensor<T>`]: the buffer the runtime hands to layers
//!
//! The first axis is the example axis. Everything after it is flattened into
//! the per-example dimension, so a `[N, C, H, W]` score tensor has
//! `num() == N` and `dim() == C * H * W`.
//!
//! ## Example
//!
//! ```rust
//! use softmax_vector_loss::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.num(), 2);
//! assert_eq!(t.dim(), 3);
//! ```

use crate::float::Float;

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g., `[2, 3]` for two examples of three values.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Total number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Number of examples, the extent of the first axis.
    ///
    /// A scalar (rank 0) tensor counts as one example.
    pub fn num(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of values per example.
    ///
    /// Zero when the tensor holds no examples.
    pub fn dim(&self) -> usize {
        match self.num() {
            0 => 0,
            n => self.count() / n,
        }
    }
}

impl<T: Float> Tensor<T> {
    /// A zero-filled tensor of the given shape.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![T::ZERO; len],
        }
    }

    /// A zero-filled tensor with this tensor's shape.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape.clone())
    }

    /// Changes the shape, reusing the allocation.
    ///
    /// Existing values are kept where the element count allows; new elements are zero.
    pub fn reshape(&mut self, shape: &[usize]) {
        if self.shape != shape {
            self.shape = shape.to_vec();
            self.data.resize(shape.iter().product(), T::ZERO);
        }
    }
}

/// A container pairing a value with its gradient.
///
/// Typically used as `WithGrad<Tensor<f32>>`, see [`GradTensor`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WithGrad<T> {
    pub value: T,
    pub grad: T,
}

/// A tensor buffer with an activation region (`value`) and a gradient region (`grad`).
pub type GradTensor<T> = WithGrad<Tensor<T>>;

impl<T: Float> WithGrad<Tensor<T>> {
    /// Wraps `value` with a zeroed gradient of the same shape.
    pub fn new(value: Tensor<T>) -> Self {
        let grad = value.zeros_like();
        Self { value, grad }
    }

    /// A zeroed buffer of the given shape.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::new(Tensor::zeros(shape))
    }

    /// Reshapes both regions.
    pub fn reshape(&mut self, shape: &[usize]) {
        self.value.reshape(shape);
        self.grad.reshape(shape);
    }

    /// The shape shared by both regions.
    pub fn shape(&self) -> &[usize] {
        &self.value.shape
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use softmax_vector_loss::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}
