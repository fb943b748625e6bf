//! Parallel CPU backend.
//!
//! # CPU Backend
//!
//! The reference path of the dispatch layer, and the only
//! implementation of softmax. Work is spread over examples with
//! [`rayon`](https://docs.rs/rayon); every example is computed independently
//! and reductions run in example order, so results do not depend on thread
//! scheduling.
//!
//! ## Implemented Ops
//!
//! - `softmax_rows`: stable softmax along the per-example dimension
//! - `softmax_rows_backward`: softmax Jacobian-vector product
//! - `vector_loss_gradient`: `(prob - exp(-t * label)) / N` elementwise
//! - `vector_loss_value`: batch-averaged, floored NLL
//! - `vector_loss_backward`: both of the above

use super::formula::{example_loss, gradient_element};
use crate::float::Float;
use rayon::prelude::*;

/// Writes `softmax(input)` row by row into `out`, rows being `dim` wide.
///
/// The row maximum is subtracted before exponentiating.
pub fn softmax_rows<T: Float>(input: &[T], dim: usize, out: &mut [T]) {
    if dim == 0 {
        return;
    }

    out.par_chunks_mut(dim)
        .zip(input.par_chunks(dim))
        .for_each(|(y, x)| {
            let max_val = x.iter().copied().fold(T::NEG_INFINITY, T::max);
            let mut exp_sum = T::ZERO;
            for (yj, &xj) in y.iter_mut().zip(x) {
                *yj = (xj - max_val).exp();
                exp_sum += *yj;
            }
            for yj in y.iter_mut() {
                *yj = *yj / exp_sum;
            }
        });
}

/// Writes `dx = y * (dy - <y, dy>)` row by row.
pub fn softmax_rows_backward<T: Float>(y: &[T], dy: &[T], dim: usize, dx: &mut [T]) {
    if dim == 0 {
        return;
    }

    dx.par_chunks_mut(dim)
        .zip(y.par_chunks(dim).zip(dy.par_chunks(dim)))
        .for_each(|(dx, (y, dy))| {
            let dot: T = y.iter().zip(dy).map(|(&yi, &dyi)| yi * dyi).sum();
            for ((dxi, &yi), &dyi) in dx.iter_mut().zip(y).zip(dy) {
                *dxi = yi * (dyi - dot);
            }
        });
}

/// Writes the final score gradient for `num` examples into `grad`.
///
/// `prob`, `labels` and `grad` must have equal, `num`-divisible lengths.
pub fn vector_loss_gradient<T: Float>(
    prob: &[T],
    labels: &[T],
    num: usize,
    temperature: T,
    grad: &mut [T],
) {
    if num == 0 || prob.is_empty() {
        return;
    }
    let dim = prob.len() / num;
    let inv_num = T::ONE / T::from_usize(num);

    grad.par_chunks_mut(dim)
        .zip(prob.par_chunks(dim).zip(labels.par_chunks(dim)))
        .for_each(|(g, (p, l))| {
            for ((gi, &pi), &li) in g.iter_mut().zip(p).zip(l) {
                *gi = gradient_element(pi, li, temperature, inv_num);
            }
        });
}

/// Mean over `num` examples of each example's floored NLL.
///
/// An empty batch has zero loss.
pub fn vector_loss_value<T: Float>(prob: &[T], labels: &[T], num: usize) -> T {
    if num == 0 || prob.is_empty() {
        return T::ZERO;
    }
    let dim = prob.len() / num;

    let terms: Vec<T> = prob
        .par_chunks(dim)
        .zip(labels.par_chunks(dim))
        .map(|(p, l)| example_loss(p, l))
        .collect();

    let total: T = terms.into_iter().sum();
    total / T::from_usize(num)
}

/// Computes the score gradient into `grad` and returns the loss.
pub fn vector_loss_backward<T: Float>(
    prob: &[T],
    labels: &[T],
    num: usize,
    temperature: T,
    grad: &mut [T],
) -> T {
    vector_loss_gradient(prob, labels, num, temperature, grad);
    vector_loss_value(prob, labels, num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::rel_eq;

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = [1.0f64, 2.0, 3.0, -1.0, 0.0, 1000.0];
        let mut y = [0.0; 6];
        softmax_rows(&x, 3, &mut y);
        for row in y.chunks(3) {
            let s: f64 = row.iter().sum();
            assert!((s - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|&p| p >= 0.0));
        }
        assert!(y[5] > 0.999);
    }

    #[test]
    fn softmax_backward_of_uniform_upstream_is_zero() {
        let y = [0.2f32, 0.3, 0.5];
        let dy = [1.0f32, 1.0, 1.0];
        let mut dx = [9.0f32; 3];
        softmax_rows_backward(&y, &dy, 3, &mut dx);
        assert!(dx.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn gradient_is_scaled_by_batch_size() {
        let prob = [0.5f64, 0.5, 0.25, 0.75];
        let labels = [0.0f64, 1.0, 1.0, 0.0];
        let mut grad = [0.0; 4];
        vector_loss_gradient(&prob, &labels, 2, 1.0, &mut grad);

        let e1 = (-1.0f64).exp();
        let unscaled = [0.5 - 1.0, 0.5 - e1, 0.25 - e1, 0.75 - 1.0];
        for (g, u) in grad.iter().zip(unscaled) {
            assert!(rel_eq(*g, u / 2.0, 1e-12));
        }
    }

    #[test]
    fn loss_is_mean_of_example_terms() {
        let prob = [0.5f64, 0.5, 0.25, 0.75];
        let labels = [0.0f64, 1.0, 1.0, 0.0];
        let loss = vector_loss_value(&prob, &labels, 2);
        let expected = (-(0.5f64).ln() - (0.75f64).ln()) / 2.0;
        assert!(rel_eq(loss, expected, 1e-12));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut grad: [f32; 0] = [];
        assert_eq!(vector_loss_backward(&[], &[], 0, 1.0, &mut grad), 0.0);
    }
}
