//! Element types the layers are generic over.
//!
//! The layers are written once against [`Float`] and instantiated for `f32`
//! and `f64`. Both instantiations floor probabilities at the same value,
//! [`Float::LOG_FLOOR`], which is the single-precision smallest normal
//! (`f32::MIN_POSITIVE`) widened to the element type.

use core::fmt::Debug;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Conversions between primitive floats.
pub trait IntermediateFp {
    /// Convert to `f32`.
    fn into_f32(self) -> f32;
    /// Convert from `f32`.
    fn from_f32(x: f32) -> Self;

    /// Convert to `f64`.
    fn into_f64(self) -> f64;
    /// Convert from `f64`.
    fn from_f64(x: f64) -> Self;
}

impl IntermediateFp for f32 {
    fn from_f32(x: Self) -> Self {
        x
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(x: f64) -> Self {
        x as Self
    }

    fn into_f32(self) -> Self {
        self
    }

    fn into_f64(self) -> f64 {
        f64::from(self)
    }
}

impl IntermediateFp for f64 {
    fn from_f32(x: f32) -> Self {
        Self::from(x)
    }

    fn from_f64(x: Self) -> Self {
        x
    }

    #[allow(clippy::cast_possible_truncation)]
    fn into_f32(self) -> f32 {
        self as f32
    }

    fn into_f64(self) -> Self {
        self
    }
}

/// Floating point element stored in tensors.
pub trait Float:
    Copy
    + Debug
    + Default
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + Sum
    + IntermediateFp
    + 'static
{
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;
    /// Lower bound applied to a probability before taking its logarithm.
    const LOG_FLOOR: Self;
    /// Negative infinity, the identity of `max`.
    const NEG_INFINITY: Self;

    /// `e^self`.
    fn exp(self) -> Self;
    /// Natural logarithm.
    fn ln(self) -> Self;
    /// Larger of the two values.
    fn max(self, other: Self) -> Self;
    /// Whether the value is neither infinite nor NaN.
    fn is_finite(self) -> bool;
    /// Whether the value is NaN.
    fn is_nan(self) -> bool;
    /// Lossy conversion of a count.
    fn from_usize(n: usize) -> Self;
}

macro_rules! impl_float {
    ($t:ty) => {
        impl Float for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            #[allow(clippy::cast_lossless)]
            const LOG_FLOOR: Self = f32::MIN_POSITIVE as $t;
            const NEG_INFINITY: Self = <$t>::NEG_INFINITY;

            #[inline]
            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            #[inline]
            fn ln(self) -> Self {
                <$t>::ln(self)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }

            #[inline]
            fn is_nan(self) -> bool {
                <$t>::is_nan(self)
            }

            #[inline]
            #[allow(clippy::cast_precision_loss)]
            fn from_usize(n: usize) -> Self {
                n as $t
            }
        }
    };
}

impl_float!(f32);
impl_float!(f64);
