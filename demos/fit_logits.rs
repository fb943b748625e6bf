//! Fits free logits to distance labels by gradient descent on the vector loss.
//!
//! Each of the examples has its own distance vector; as training goes on the
//! probabilities concentrate on the dimensions at distance zero.

use softmax_vector_loss::prelude::*;
use tracing::info;

fn main() -> Result<(), LayerError> {
    tracing_subscriber::fmt().with_target(false).init();

    let dim = 5;
    let distances = vec![
        0.0, 1.0, 2.0, 3.0, 4.0, //
        2.0, 1.0, 0.0, 1.0, 2.0, //
        4.0, 3.0, 2.0, 1.0, 0.0,
    ];
    let num = distances.len() / dim;

    let mut scores = GradTensor::new(Tensor::zeros(vec![num, dim]));
    let mut labels = GradTensor::new(Tensor::new(vec![num, dim], distances));

    let params = VectorLossParams::with_temperature(2.0);
    let mut loss = SoftmaxWithVectorLossLayer::<f32>::new(params)?;
    loss.setup(&[&scores, &labels], &mut [])?;

    let lr = 2.0;
    let epochs = 200;

    for epoch in 0..epochs {
        loss.forward(&[&scores, &labels], &mut [])?;
        let value = loss.backward(&[], true, &mut [&mut scores, &mut labels])?;

        for (w, g) in scores.value.data.iter_mut().zip(&scores.grad.data) {
            *w -= lr * g;
        }

        if epoch % 20 == 0 || epoch == epochs - 1 {
            info!(epoch, loss = value, "training");
        }
    }

    for (i, row) in loss.probabilities().value.data.chunks(dim).enumerate() {
        info!(example = i, probabilities = ?row, "fitted");
    }
    Ok(())
}
