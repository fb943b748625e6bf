use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use softmax_vector_loss::approx::{ApproxEquality, RelativeEq, rel_eq};
use softmax_vector_loss::ops::cpu::softmax_rows;
use softmax_vector_loss::prelude::*;

/// Runs one setup/forward/backward cycle, returning the loss, the score
/// gradient and the probabilities.
fn run<T: Float>(
    params: VectorLossParams,
    shape: &[usize],
    scores: Vec<T>,
    labels: Vec<T>,
) -> (T, Vec<T>, Vec<T>) {
    let mut scores = GradTensor::new(Tensor::new(shape, scores));
    let mut labels = GradTensor::new(Tensor::new(shape, labels));
    let mut layer = SoftmaxWithVectorLossLayer::new(params).unwrap();

    layer.setup(&[&scores, &labels], &mut []).unwrap();
    layer.forward(&[&scores, &labels], &mut []).unwrap();
    let loss = layer
        .backward(&[], true, &mut [&mut scores, &mut labels])
        .unwrap();
    (loss, scores.grad.data, layer.probabilities().value.data.clone())
}

fn random_logits(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(-4.0..4.0)).collect()
}

fn random_distances(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(0.0..5.0)).collect()
}

#[test]
fn uniform_scores_with_ordered_distances_cost_ln3() {
    let (loss, grad, prob) = run(
        VectorLossParams::default(),
        &[2, 3],
        vec![0.0f64; 6],
        vec![0.0, 1.0, 2.0, 2.0, 1.0, 0.0],
    );

    assert!(prob.iter().all(|&p| (p - 1.0 / 3.0).abs() < 1e-12));
    assert!((loss - 3f64.ln()).abs() < 1e-12);

    let e = |d: f64| (-d).exp();
    let expected = [
        (1.0 / 3.0 - e(0.0)) / 2.0,
        (1.0 / 3.0 - e(1.0)) / 2.0,
        (1.0 / 3.0 - e(2.0)) / 2.0,
        (1.0 / 3.0 - e(2.0)) / 2.0,
        (1.0 / 3.0 - e(1.0)) / 2.0,
        (1.0 / 3.0 - e(0.0)) / 2.0,
    ];
    assert_eq!(grad[..].approx_eq(&expected[..]), ApproxEquality::Precise);
}

#[test]
fn zero_distances_give_probability_minus_one() {
    let (_, grad, prob) = run(
        VectorLossParams::with_temperature(3.7),
        &[1, 4],
        vec![0.5f64, -1.0, 2.0, 0.0],
        vec![0.0; 4],
    );
    for (g, p) in grad.iter().zip(&prob) {
        assert!((g - (p - 1.0)).abs() < 1e-12);
    }
}

#[test]
fn gradient_follows_soft_targets() {
    let mut rng = StdRng::seed_from_u64(7);
    let (num, dim, t) = (4, 6, 0.75);
    let scores = random_logits(&mut rng, num * dim);
    let labels = random_distances(&mut rng, num * dim);

    let (_, grad, prob) = run(
        VectorLossParams::with_temperature(t),
        &[num, dim],
        scores,
        labels.clone(),
    );
    for i in 0..num * dim {
        let expected = (prob[i] - (-t * labels[i]).exp()) / num as f64;
        assert!(rel_eq(grad[i], expected, 1e-12));
    }
}

#[test]
fn duplicating_the_batch_keeps_loss_and_halves_gradient() {
    let mut rng = StdRng::seed_from_u64(11);
    let (num, dim) = (3, 5);
    let scores = random_logits(&mut rng, num * dim);
    let labels = random_distances(&mut rng, num * dim);
    let params = VectorLossParams::with_temperature(1.3);

    let (loss, grad, _) = run(params, &[num, dim], scores.clone(), labels.clone());
    let (loss2, grad2, _) = run(
        params,
        &[2 * num, dim],
        [scores.clone(), scores].concat(),
        [labels.clone(), labels].concat(),
    );

    assert!(rel_eq(loss, loss2, 1e-12));
    for (g, g2) in grad.iter().zip(&grad2[..num * dim]) {
        assert!(rel_eq(*g, 2.0 * g2, 1e-12));
    }
}

#[test]
fn vanishing_probability_is_floored() {
    let floor = -f64::from(f32::MIN_POSITIVE).ln();

    let (loss, grad, prob) = run(
        VectorLossParams::default(),
        &[1, 2],
        vec![-1000.0f64, 0.0],
        vec![0.0, 5.0],
    );
    assert_eq!(prob[0], 0.0);
    assert!(rel_eq(loss, floor, 1e-12));
    assert!(grad.iter().all(|g| g.is_finite()));

    let (loss32, _, _) = run(
        VectorLossParams::default(),
        &[1, 2],
        vec![-1000.0f32, 0.0],
        vec![0.0, 5.0],
    );
    assert!(rel_eq(f64::from(loss32), floor, 1e-6));
}

#[test]
fn loss_indexes_the_nearest_target() {
    // the first of two equal minima wins
    let (loss, _, prob) = run(
        VectorLossParams::default(),
        &[1, 3],
        vec![1.0f64, 2.0, 3.0],
        vec![2.0, 0.5, 0.5],
    );
    assert!(rel_eq(loss, -prob[1].ln(), 1e-12));
}

#[test]
fn single_and_double_precision_agree() {
    let mut rng = StdRng::seed_from_u64(3);
    let (num, dim) = (8, 7);
    let scores = random_logits(&mut rng, num * dim);
    let labels = random_distances(&mut rng, num * dim);
    let narrow = |v: &[f64]| v.iter().map(|&x| x as f32).collect::<Vec<_>>();
    let params = VectorLossParams::with_temperature(0.5);

    let (loss64, grad64, _) = run(params, &[num, dim], scores.clone(), labels.clone());
    let (loss32, grad32, _) = run(params, &[num, dim], narrow(&scores), narrow(&labels));

    assert!(rel_eq(f64::from(loss32), loss64, 1e-5));
    for (a, b) in grad32.iter().zip(&grad64) {
        assert!(rel_eq(f64::from(*a), *b, 1e-5));
    }
}

#[test]
fn pinned_backends_agree_with_cpu() {
    let mut rng = StdRng::seed_from_u64(5);
    let (num, dim) = (16, 9);
    let narrow = |v: Vec<f64>| v.into_iter().map(|x| x as f32).collect::<Vec<_>>();
    let scores = narrow(random_logits(&mut rng, num * dim));
    let labels = narrow(random_distances(&mut rng, num * dim));

    let mut reference = None;
    for backend in [Backend::Cpu, Backend::Wgpu, Backend::Cuda] {
        let params = VectorLossParams {
            temperature: 1.0,
            backend: Some(backend),
        };
        let (loss, grad, _) = run(params, &[num, dim], scores.clone(), labels.clone());
        match &reference {
            None => reference = Some((loss, grad)),
            Some((cpu_loss, cpu_grad)) => {
                assert!(rel_eq(loss, *cpu_loss, 1e-5), "{backend:?}");
                for (a, b) in grad.iter().zip(cpu_grad) {
                    assert!(rel_eq(*a, *b, 1e-5), "{backend:?}");
                }
            }
        }
    }
}

#[test]
fn propagate_down_does_not_suppress_the_gradient() {
    let mut scores = GradTensor::new(Tensor::new(vec![1, 2], vec![0.0f64, 0.0]));
    let mut labels = GradTensor::new(Tensor::new(vec![1, 2], vec![0.0, 0.0]));
    let mut layer = SoftmaxWithVectorLossLayer::new(VectorLossParams::default()).unwrap();
    layer.setup(&[&scores, &labels], &mut []).unwrap();
    layer.forward(&[&scores, &labels], &mut []).unwrap();
    layer
        .backward(&[], false, &mut [&mut scores, &mut labels])
        .unwrap();
    assert_eq!(scores.grad.data, vec![-0.5, -0.5]);
    assert_eq!(labels.grad.data, vec![0.0, 0.0]);
}

/// A probability layer that ignores its input and predicts a fixed row.
struct Fixed(Vec<f64>);

impl Layer<f64> for Fixed {
    fn type_name(&self) -> &'static str {
        "Fixed"
    }

    fn setup(
        &mut self,
        bottom: &[&GradTensor<f64>],
        top: &mut [&mut GradTensor<f64>],
    ) -> Result<(), LayerError> {
        top[0].reshape(bottom[0].shape());
        Ok(())
    }

    fn forward(
        &mut self,
        _bottom: &[&GradTensor<f64>],
        top: &mut [&mut GradTensor<f64>],
    ) -> Result<(), LayerError> {
        let dim = self.0.len();
        for row in top[0].value.data.chunks_mut(dim) {
            row.copy_from_slice(&self.0);
        }
        Ok(())
    }

    fn backward(
        &mut self,
        _top: &[&GradTensor<f64>],
        _propagate_down: bool,
        _bottom: &mut [&mut GradTensor<f64>],
    ) -> Result<f64, LayerError> {
        Ok(0.0)
    }
}

#[test]
fn probability_layer_is_pluggable() {
    let fixed = Box::new(Fixed(vec![0.25, 0.5, 0.25]));
    let mut layer =
        SoftmaxWithVectorLossLayer::with_probability_layer(VectorLossParams::default(), fixed)
            .unwrap();

    let mut scores = GradTensor::<f64>::zeros(vec![1, 3]);
    let mut labels = GradTensor::new(Tensor::new(vec![1, 3], vec![3.0, 0.0, 1.0]));
    layer.setup(&[&scores, &labels], &mut []).unwrap();
    layer.forward(&[&scores, &labels], &mut []).unwrap();
    let loss = layer
        .backward(&[], true, &mut [&mut scores, &mut labels])
        .unwrap();

    assert!(rel_eq(loss, 2f64.ln(), 1e-12));
    assert!(rel_eq(scores.grad.data[1], -0.5, 1e-12));
}

#[test]
fn params_from_json_drive_the_layer() {
    let json = r#"{ "temperature": 2.0, "backend": "cpu" }"#;
    let params = VectorLossParams::from_json_str(json).unwrap();
    let layer = SoftmaxWithVectorLossLayer::<f32>::new(params).unwrap();
    assert_eq!(layer.backend(), Backend::Cpu);

    let mut probs = vec![0.0f64; 3];
    softmax_rows(&[0.0, 0.0, 0.0], 3, &mut probs);
    let (_, grad, _) = run(params, &[1, 3], vec![0.0f64; 3], vec![0.0, 0.5, 1.0]);
    assert!(rel_eq(grad[1], probs[1] - (-1.0f64).exp(), 1e-12));
}
