use super::SoftmaxLayer;
use crate::backend::{Backend, get_backend};
use crate::config::VectorLossParams;
use crate::error::LayerError;
use crate::float::Float;
use crate::layer::{Layer, check_bottom_count, check_count, check_shape, check_top_count};
use crate::ops::dispatch::vector_loss_backward_on;
use crate::tensors::GradTensor;

/// Softmax followed by a cross-entropy whose targets come from continuous
/// label vectors.
///
/// Bottoms are `[scores, labels]`, both with `N` examples of `D` values; the
/// layer has no tops. A label value `d` at dimension `l` is a distance (for
/// example a distance-transform value) and becomes the soft target
/// `exp(-temperature * d)`: distance zero is the full target.
///
/// - `forward` only refreshes the internal probabilities.
/// - `backward` writes `(prob - exp(-temperature * label)) / N` into the score
///   gradient and returns the batch-averaged negative log-likelihood of each
///   example's nearest target, `-ln(max(prob[i, argmin(label[i])], floor))`.
///
/// # Example
/// ```
/// use softmax_vector_loss::config::VectorLossParams;
/// use softmax_vector_loss::layer::Layer;
/// use softmax_vector_loss::layers::SoftmaxWithVectorLossLayer;
/// use softmax_vector_loss::tensors::{GradTensor, Tensor};
///
/// let mut scores = GradTensor::new(Tensor::new(vec![1, 3], vec![0.0f32, 0.0, 0.0]));
/// let labels = GradTensor::new(Tensor::new(vec![1, 3], vec![0.0f32, 1.0, 2.0]));
///
/// let mut layer = SoftmaxWithVectorLossLayer::new(VectorLossParams::default())?;
/// layer.setup(&[&scores, &labels], &mut [])?;
/// layer.forward(&[&scores, &labels], &mut [])?;
/// let loss = layer.backward(&[], true, &mut [&mut scores, &mut labels.clone()])?;
///
/// assert!((loss - 3f32.ln()).abs() < 1e-6);
/// assert!((scores.grad.data[0] - (1.0 / 3.0 - 1.0)).abs() < 1e-6);
/// # Ok::<(), softmax_vector_loss::error::LayerError>(())
/// ```
pub struct SoftmaxWithVectorLossLayer<T: Float> {
    params: VectorLossParams,
    backend: Option<Backend>,
    softmax: Box<dyn Layer<T> + Send>,
    prob: GradTensor<T>,
    temperature: Option<T>,
}

impl<T: Float> core::fmt::Debug for SoftmaxWithVectorLossLayer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct(Self::NAME)
            .field("probability", &self.softmax.type_name())
            .field("temperature", &self.temperature)
            .field("backend", &self.backend)
            .field("shape", &self.prob.shape())
            .finish()
    }
}

impl<T: Float> SoftmaxWithVectorLossLayer<T> {
    const NAME: &'static str = "SoftmaxWithVectorLoss";

    /// A layer normalizing scores with [`SoftmaxLayer`].
    ///
    /// # Errors
    /// [`LayerError::Config`] if the parameters fail validation.
    pub fn new(params: VectorLossParams) -> Result<Self, LayerError> {
        Self::with_probability_layer(params, Box::new(SoftmaxLayer::new()))
    }

    /// A layer delegating normalization to `probability`, which it owns from now on.
    ///
    /// # Errors
    /// [`LayerError::Config`] if the parameters fail validation.
    pub fn with_probability_layer(
        params: VectorLossParams,
        probability: Box<dyn Layer<T> + Send>,
    ) -> Result<Self, LayerError> {
        let params = params.validated()?;
        Ok(Self {
            params,
            backend: params.backend,
            softmax: probability,
            prob: GradTensor::default(),
            temperature: None,
        })
    }

    /// Pins the backend of the backward pass, overriding the global default.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// The backend the next backward pass will request.
    pub fn backend(&self) -> Backend {
        self.backend.unwrap_or_else(get_backend)
    }

    /// The temperature captured at setup, if set up.
    pub fn temperature(&self) -> Option<T> {
        self.temperature
    }

    /// The probabilities computed by the last forward pass.
    pub fn probabilities(&self) -> &GradTensor<T> {
        &self.prob
    }
}

impl<T: Float> Layer<T> for SoftmaxWithVectorLossLayer<T> {
    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn setup(
        &mut self,
        bottom: &[&GradTensor<T>],
        top: &mut [&mut GradTensor<T>],
    ) -> Result<(), LayerError> {
        check_bottom_count(Self::NAME, 2, bottom.len())?;
        check_top_count(Self::NAME, 0, top.len())?;
        check_shape("labels", bottom[0].shape(), bottom[1].shape())?;
        check_count("labels", bottom[0].value.count(), bottom[1].value.count())?;

        self.softmax.setup(&bottom[..1], &mut [&mut self.prob])?;

        let temperature = T::from_f64(self.params.temperature);
        tracing::info!(temperature = self.params.temperature, "vector loss set up");
        self.temperature = Some(temperature);
        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &[&GradTensor<T>],
        top: &mut [&mut GradTensor<T>],
    ) -> Result<(), LayerError> {
        if self.temperature.is_none() {
            return Err(LayerError::NotSetUp(Self::NAME));
        }
        check_bottom_count(Self::NAME, 2, bottom.len())?;
        check_top_count(Self::NAME, 0, top.len())?;

        self.softmax.forward(&bottom[..1], &mut [&mut self.prob])
    }

    /// Loss layers always produce their score gradient, so `propagate_down`
    /// is accepted but not consulted.
    fn backward(
        &mut self,
        top: &[&GradTensor<T>],
        _propagate_down: bool,
        bottom: &mut [&mut GradTensor<T>],
    ) -> Result<T, LayerError> {
        let temperature = self.temperature.ok_or(LayerError::NotSetUp(Self::NAME))?;
        check_top_count(Self::NAME, 0, top.len())?;
        check_bottom_count(Self::NAME, 2, bottom.len())?;

        let (scores, labels) = bottom.split_at_mut(1);
        let scores = &mut *scores[0];
        let labels = &labels[0].value;

        let shape = scores.shape();
        check_shape("probabilities", shape, self.prob.shape())?;
        check_shape("labels", shape, &labels.shape)?;
        check_shape("score gradient", shape, &scores.grad.shape)?;

        let num = scores.value.num();
        let count = scores.value.count();
        check_count("probabilities", count, self.prob.value.count())?;
        check_count("labels", count, labels.count())?;
        check_count("score gradient", count, scores.grad.count())?;

        let loss = vector_loss_backward_on(
            self.backend(),
            &self.prob.value.data,
            &labels.data,
            num,
            temperature,
            &mut scores.grad.data,
        );
        Ok(loss)
    }
}
