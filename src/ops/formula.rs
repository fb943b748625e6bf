//! The vector loss, one element at a time.
//!
//! Every backend computes its results from these functions. The CPU path
//! calls them directly; the WGPU kernel in `shaders/vector_loss_grad.wgsl` is
//! a line-for-line transcription of [`gradient_element`], and its loss is
//! reduced on the host with [`example_loss`].

use crate::float::Float;

/// Target weight of a dimension at distance `label`: `exp(-temperature * label)`.
///
/// A label of zero yields the full weight `1`.
#[inline]
pub fn soft_target<T: Float>(label: T, temperature: T) -> T {
    (-(temperature * label)).exp()
}

/// Final score gradient of one element: `(prob - soft_target) * inv_num`.
#[inline]
pub fn gradient_element<T: Float>(prob: T, label: T, temperature: T, inv_num: T) -> T {
    (prob - soft_target(label, temperature)) * inv_num
}

/// Negative log-likelihood of `prob`, floored at [`Float::LOG_FLOOR`].
///
/// A zero (or NaN) probability yields `-ln(LOG_FLOOR)` rather than infinity.
#[inline]
pub fn nll<T: Float>(prob: T) -> T {
    -prob.max(T::LOG_FLOOR).ln()
}

/// Index of the smallest label of one example, the lowest index on ties.
///
/// This is the dimension carrying the largest soft target. NaN labels never
/// win. Returns `None` for an empty row or a row of NaNs.
pub fn nearest_target<T: Float>(labels: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &l) in labels.iter().enumerate() {
        let better = match best {
            Some((_, b)) => l < b,
            None => !l.is_nan(),
        };
        if better {
            best = Some((i, l));
        }
    }
    best.map(|(i, _)| i)
}

/// Loss term of one example: the NLL of the probability at its nearest-target index.
pub fn example_loss<T: Float>(probs: &[T], labels: &[T]) -> T {
    nearest_target(labels).map_or(T::ZERO, |k| nll(probs[k]))
}
