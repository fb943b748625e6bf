use crate::error::LayerError;
use crate::float::Float;
use crate::layer::{Layer, check_bottom_count, check_count, check_shape, check_top_count};
use crate::ops::cpu::{softmax_rows, softmax_rows_backward};
use crate::tensors::GradTensor;
use core::marker::PhantomData;

/// Softmax along the per-example dimension.
///
/// Takes one bottom and produces one top of the same shape whose rows are
/// probability distributions.
#[derive(Debug, Default)]
pub struct SoftmaxLayer<T> {
    is_set_up: bool,
    _elem: PhantomData<T>,
}

impl<T: Float> SoftmaxLayer<T> {
    const NAME: &'static str = "Softmax";

    /// A layer awaiting `setup`.
    pub fn new() -> Self {
        Self {
            is_set_up: false,
            _elem: PhantomData,
        }
    }
}

impl<T: Float> Layer<T> for SoftmaxLayer<T> {
    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn setup(
        &mut self,
        bottom: &[&GradTensor<T>],
        top: &mut [&mut GradTensor<T>],
    ) -> Result<(), LayerError> {
        check_bottom_count(Self::NAME, 1, bottom.len())?;
        check_top_count(Self::NAME, 1, top.len())?;
        top[0].reshape(bottom[0].shape());
        self.is_set_up = true;
        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &[&GradTensor<T>],
        top: &mut [&mut GradTensor<T>],
    ) -> Result<(), LayerError> {
        if !self.is_set_up {
            return Err(LayerError::NotSetUp(Self::NAME));
        }
        check_bottom_count(Self::NAME, 1, bottom.len())?;
        check_top_count(Self::NAME, 1, top.len())?;

        let input = &bottom[0].value;
        top[0].reshape(&input.shape);
        softmax_rows(&input.data, input.dim(), &mut top[0].value.data);
        Ok(())
    }

    fn backward(
        &mut self,
        top: &[&GradTensor<T>],
        propagate_down: bool,
        bottom: &mut [&mut GradTensor<T>],
    ) -> Result<T, LayerError> {
        if !self.is_set_up {
            return Err(LayerError::NotSetUp(Self::NAME));
        }
        if !propagate_down {
            return Ok(T::ZERO);
        }
        check_top_count(Self::NAME, 1, top.len())?;
        check_bottom_count(Self::NAME, 1, bottom.len())?;

        let out = top[0];
        let target = &mut bottom[0].grad;
        check_shape("softmax bottom gradient", &out.value.shape, &target.shape)?;
        check_count("softmax bottom gradient", out.value.count(), target.count())?;
        softmax_rows_backward(&out.value.data, &out.grad.data, out.value.dim(), &mut target.data);
        Ok(T::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::{Tensor, WithGrad};

    #[test]
    fn forward_normalizes_each_example() {
        let x = WithGrad::new(Tensor::new(vec![2, 3], vec![1.0f64, 2.0, 3.0, 0.0, 0.0, 0.0]));
        let mut y = GradTensor::default();
        let mut layer = SoftmaxLayer::new();
        layer.setup(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&x], &mut [&mut y]).unwrap();

        assert_eq!(y.shape(), &[2, 3]);
        for row in y.value.data.chunks(3) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        assert!(y.value.data[..3].windows(2).all(|w| w[0] < w[1]));
        assert!(y.value.data[3..].iter().all(|&p| (p - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn forward_before_setup_fails() {
        let x = GradTensor::<f32>::zeros(vec![1, 2]);
        let mut y = GradTensor::default();
        let err = SoftmaxLayer::new().forward(&[&x], &mut [&mut y]).unwrap_err();
        assert_eq!(err, LayerError::NotSetUp("Softmax"));
    }

    #[test]
    fn setup_rejects_missing_top() {
        let x = GradTensor::<f32>::zeros(vec![1, 2]);
        let err = SoftmaxLayer::new().setup(&[&x], &mut []).unwrap_err();
        assert!(matches!(err, LayerError::TopCount { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let logits = vec![0.3f64, -1.2, 0.8, 2.0];
        let upstream = vec![0.5f64, -0.25, 1.0, 0.1];
        let mut x = WithGrad::new(Tensor::new(vec![1, 4], logits.clone()));
        let mut y = GradTensor::default();
        let mut layer = SoftmaxLayer::new();
        layer.setup(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&x], &mut [&mut y]).unwrap();
        y.grad.data.clone_from(&upstream);
        layer.backward(&[&y], true, &mut [&mut x]).unwrap();

        let objective = |z: &[f64]| {
            let mut p = vec![0.0; z.len()];
            softmax_rows(z, z.len(), &mut p);
            p.iter().zip(&upstream).map(|(a, b)| a * b).sum::<f64>()
        };
        let h = 1e-6;
        for j in 0..logits.len() {
            let mut plus = logits.clone();
            let mut minus = logits.clone();
            plus[j] += h;
            minus[j] -= h;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * h);
            assert!((numeric - x.grad.data[j]).abs() < 1e-6);
        }
    }

    #[test]
    fn backward_rejects_reshaped_bottom_gradient() {
        let mut x = GradTensor::<f64>::zeros(vec![2, 3]);
        let mut y = GradTensor::default();
        let mut layer = SoftmaxLayer::new();
        layer.setup(&[&x], &mut [&mut y]).unwrap();
        layer.forward(&[&x], &mut [&mut y]).unwrap();

        x.reshape(&[3, 2]);
        let err = layer.backward(&[&y], true, &mut [&mut x]).unwrap_err();
        assert!(matches!(err, LayerError::ShapeMismatch { what: "softmax bottom gradient", .. }));
    }
}
