use crate::data::AugmentedImageSequence;
use crate::error::Result;
use crate::model::loss::WeightedBinaryCrossEntropy;
use crate::model::ChexNet;
use crate::training::callbacks::{CallbackManager, TrainingCallback};
use crate::training::scheduler::ReduceLrOnPlateau;
use crate::training::{EpochLogs, TrainingResult, TrainingState};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::{AutodiffBackend, Backend};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{debug, info};

/// Optimisation schedule for a run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub initial_learning_rate: f64,
    pub min_learning_rate: f64,
    /// Epochs without validation-loss improvement before the rate drops
    pub patience_reduce_lr: usize,
    pub lr_reduce_factor: f64,
    /// Draw a per-epoch progress bar
    pub show_progress: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            initial_learning_rate: 0.001,
            min_learning_rate: 1e-8,
            patience_reduce_lr: 1,
            lr_reduce_factor: 0.1,
            show_progress: true,
        }
    }
}

/// Trainer for multi-label image classifiers
pub struct Trainer<B: AutodiffBackend> {
    config: TrainerConfig,
    device: B::Device,
    callbacks: CallbackManager<B::InnerBackend>,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainerConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            callbacks: CallbackManager::new(),
        }
    }

    pub fn with_callback<C: TrainingCallback<B::InnerBackend> + 'static>(mut self, callback: C) -> Self {
        self.callbacks.add_callback(callback);
        self
    }

    /// Train `model` and return it with the run summary
    ///
    /// Each epoch runs every batch of `train`, then every batch of
    /// `validation` on the inference copy of the model; both sequences
    /// are advanced with `on_epoch_end` afterwards.
    pub fn fit(
        &mut self,
        mut model: ChexNet<B>,
        train: &mut AugmentedImageSequence,
        validation: &mut AugmentedImageSequence,
        loss: &WeightedBinaryCrossEntropy,
    ) -> Result<(ChexNet<B>, TrainingResult)> {
        let start_time = Instant::now();
        let mut state = TrainingState::new();
        let mut optim = AdamConfig::new().init::<B, ChexNet<B>>();
        let mut scheduler = ReduceLrOnPlateau::new(
            self.config.initial_learning_rate,
            self.config.lr_reduce_factor,
            self.config.patience_reduce_lr,
            self.config.min_learning_rate,
        );
        let val_loss_fn = WeightedBinaryCrossEntropy::unweighted(validation.num_classes());

        info!(
            "Training for {} epochs: {} train steps, {} validation steps",
            self.config.epochs,
            train.len(),
            validation.len()
        );
        self.callbacks.on_train_begin(self.config.epochs);

        for epoch in 0..self.config.epochs {
            let lr = scheduler.lr();
            self.callbacks.on_epoch_begin(epoch);

            let pb = self.progress_bar(train.len() as u64, epoch);
            let mut loss_sum = 0.0;
            for idx in 0..train.len() {
                let batch = train.batch(idx)?;
                let (images, targets) = batch.to_tensors::<B>(&self.device);

                let logits = model.forward(images);
                let batch_loss = loss.forward(logits, targets);
                let value = scalar(batch_loss.clone().detach());

                let grads = GradientsParams::from_grads(batch_loss.backward(), &model);
                model = optim.step(lr, model, grads);

                loss_sum += value;
                state.global_step += 1;
                pb.set_message(format!("loss {value:.4}"));
                pb.inc(1);
            }
            pb.finish_and_clear();
            train.on_epoch_end();

            let train_loss = mean_or_nan(loss_sum, train.len());
            let valid = model.valid();
            let (val_loss, val_scores, val_labels) =
                self.evaluate(&valid, validation, &val_loss_fn)?;
            validation.on_epoch_end();

            let logs = EpochLogs {
                epoch,
                train_loss,
                val_loss,
                lr,
                val_scores,
                val_labels,
                num_classes: validation.num_classes(),
            };
            state.update_epoch(&logs);
            self.callbacks.on_epoch_end(&logs, &valid)?;

            let next_lr = scheduler.step(val_loss);
            debug!("Epoch {} done, next lr {:.3e}", epoch + 1, next_lr);
        }

        self.callbacks.on_train_end(&state);

        let result = TrainingResult {
            state,
            best_mean_auroc: None,
            best_weights: None,
            duration_secs: start_time.elapsed().as_secs_f64(),
        };
        Ok((model, result))
    }

    /// Mean unweighted loss plus probabilities and labels of every validation sample
    fn evaluate(
        &self,
        model: &ChexNet<B::InnerBackend>,
        validation: &AugmentedImageSequence,
        loss: &WeightedBinaryCrossEntropy,
    ) -> Result<(f64, Vec<f32>, Vec<f32>)> {
        let mut loss_sum = 0.0;
        let mut scores = Vec::new();
        let mut labels = Vec::new();

        for idx in 0..validation.len() {
            let batch = validation.batch(idx)?;
            let (images, targets) = batch.to_tensors::<B::InnerBackend>(&self.device);

            let logits = model.forward(images);
            loss_sum += scalar(loss.forward(logits.clone(), targets));
            scores.extend(sigmoid(logits).into_data().iter::<f32>());
            labels.extend_from_slice(&batch.labels);
        }

        Ok((mean_or_nan(loss_sum, validation.len()), scores, labels))
    }

    fn progress_bar(&self, len: u64, epoch: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_prefix(format!("epoch {}", epoch + 1));
        pb
    }
}

fn scalar<B: Backend>(tensor: burn::tensor::Tensor<B, 1>) -> f64 {
    let data = tensor.into_data();
    let value = data.iter::<f32>().next().map(f64::from);
    value.unwrap_or(f64::NAN)
}

fn mean_or_nan(sum: f64, count: usize) -> f64 {
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SequenceConfig;
    use crate::model::architecture::tests::tiny_densenet;
    use crate::model::checkpoint::TrainingStats;
    use crate::training::callbacks::{ModelCheckpointCallback, MultiClassAurocCallback};
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn classes() -> Vec<String> {
        vec!["Effusion".to_string()]
    }

    /// Bright images are positive, dark ones negative
    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("images");
        std::fs::create_dir_all(&images).unwrap();

        let mut csv = String::from("Image Index,Effusion\n");
        for i in 0..4u8 {
            let name = format!("{i}.png");
            let level = if i % 2 == 0 { 20 } else { 230 };
            RgbImage::from_pixel(32, 32, Rgb([level; 3]))
                .save(images.join(&name))
                .unwrap();
            csv.push_str(&format!("{name},{}\n", i % 2));
        }
        std::fs::write(temp.path().join("train.csv"), &csv).unwrap();
        std::fs::write(temp.path().join("validation.csv"), &csv).unwrap();
        temp
    }

    fn sequence(temp: &TempDir, split: &str, steps: usize) -> AugmentedImageSequence {
        let config = SequenceConfig::new(
            temp.path().join(format!("{split}.csv")),
            &classes(),
            temp.path().join("images"),
            2,
            (32, 32),
        )
        .with_steps(steps);
        AugmentedImageSequence::new(config).unwrap()
    }

    fn trainer_config(epochs: usize) -> TrainerConfig {
        TrainerConfig {
            epochs,
            show_progress: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_runs_and_saves_checkpoints() {
        let temp = fixture();
        let device = Default::default();
        let model = tiny_densenet::<TestBackend>(1, &device);

        let mut trainer = Trainer::<TestBackend>::new(trainer_config(2), device)
            .with_callback(ModelCheckpointCallback::new(temp.path().join("weights.h5")))
            .with_callback(MultiClassAurocCallback::new(
                &classes(),
                temp.path(),
                "best_weights.h5",
                TrainingStats::default(),
            ));

        let mut train = sequence(&temp, "train", 2);
        let mut validation = sequence(&temp, "validation", 2);
        let loss = WeightedBinaryCrossEntropy::new(vec![(2.0, 2.0)]);

        let (model, result) = trainer.fit(model, &mut train, &mut validation, &loss).unwrap();

        assert_eq!(model.num_classes(), 1);
        assert_eq!(result.state.epoch, 2);
        assert_eq!(result.state.global_step, 4);
        assert!(result.state.train_loss_history.iter().all(|l| l.is_finite()));
        assert!(temp.path().join("weights.mpk").exists());
        assert!(temp.path().join("best_weights.mpk").exists());
        assert_eq!(train.epoch(), 2);
    }

    #[test]
    fn test_zero_steps_are_tolerated() {
        let temp = fixture();
        let device = Default::default();
        let model = tiny_densenet::<TestBackend>(1, &device);

        let mut trainer = Trainer::<TestBackend>::new(trainer_config(1), device)
            .with_callback(ModelCheckpointCallback::new(temp.path().join("weights.h5")));

        let mut train = sequence(&temp, "train", 0);
        let mut validation = sequence(&temp, "validation", 0);
        let loss = WeightedBinaryCrossEntropy::unweighted(1);

        let (_, result) = trainer.fit(model, &mut train, &mut validation, &loss).unwrap();

        assert_eq!(result.state.global_step, 0);
        assert!(result.state.val_loss_history[0].is_nan());
        assert!(!temp.path().join("weights.mpk").exists());
    }
}
