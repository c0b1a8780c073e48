use burn::tensor::activation::log_sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// Class-weighted binary cross-entropy on logits
///
/// Each class contributes `-(w_pos * y * log σ(x) + w_neg * (1 - y) * log(1 - σ(x)))`,
/// averaged over every sample and class.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedBinaryCrossEntropy {
    /// `(positive, negative)` weight per class
    weights: Vec<(f32, f32)>,
}

impl WeightedBinaryCrossEntropy {
    pub fn new(weights: Vec<(f32, f32)>) -> Self {
        Self { weights }
    }

    /// Plain BCE, used for validation loss
    pub fn unweighted(num_classes: usize) -> Self {
        Self::new(vec![(1.0, 1.0); num_classes])
    }

    pub fn num_classes(&self) -> usize {
        self.weights.len()
    }

    /// Mean loss as a single-element tensor
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, classes] = logits.dims();
        let device = logits.device();

        let positive = self.expand::<B>(|(p, _)| p, batch, classes, &device);
        let negative = self.expand::<B>(|(_, n)| n, batch, classes, &device);

        // log(1 - σ(x)) = log σ(-x)
        let log_p = log_sigmoid(logits.clone());
        let log_not_p = log_sigmoid(logits.neg());

        let pos_term = targets.clone() * log_p * positive;
        let neg_term = targets.neg().add_scalar(1.0) * log_not_p * negative;

        (pos_term + neg_term).neg().mean()
    }

    /// Broadcast one side of the weights to `[batch, classes]`; missing classes weigh 1
    fn expand<B: Backend>(
        &self,
        side: impl Fn((f32, f32)) -> f32,
        batch: usize,
        classes: usize,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let row: Vec<f32> = (0..classes)
            .map(|c| self.weights.get(c).copied().map(&side).unwrap_or(1.0))
            .collect();
        Tensor::from_data(TensorData::new(row.repeat(batch), [batch, classes]), device)
    }
}
