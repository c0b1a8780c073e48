use crate::error::{ChexNetError, Result};
use crate::model::checkpoint::{self, TrainingStats};
use crate::model::ChexNet;
use crate::training::metrics::{nan_mean, per_class_auroc};
use crate::training::{EpochLogs, TrainingState};
use crate::utils::format_duration;
use burn::tensor::backend::Backend;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Log of every mean AUROC improvement, appended across runs
pub const BEST_AUROC_LOG: &str = "best_auroc.log";

/// Training callback trait
///
/// Callbacks see the inference copy of the model after each validation pass.
pub trait TrainingCallback<B: Backend> {
    /// Called at the start of training
    fn on_train_begin(&mut self, _epochs: usize) {}

    /// Called at the start of each epoch
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    /// Called after validation; errors abort training
    fn on_epoch_end(&mut self, _logs: &EpochLogs, _model: &ChexNet<B>) -> Result<()> {
        Ok(())
    }

    /// Called at the end of training
    fn on_train_end(&mut self, _state: &TrainingState) {}
}

/// Callback manager that handles multiple callbacks
pub struct CallbackManager<B: Backend> {
    callbacks: Vec<Box<dyn TrainingCallback<B>>>,
}

impl<B: Backend> CallbackManager<B> {
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback<C: TrainingCallback<B> + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn on_train_begin(&mut self, epochs: usize) {
        for callback in &mut self.callbacks {
            callback.on_train_begin(epochs);
        }
    }

    pub fn on_epoch_begin(&mut self, epoch: usize) {
        for callback in &mut self.callbacks {
            callback.on_epoch_begin(epoch);
        }
    }

    pub fn on_epoch_end(&mut self, logs: &EpochLogs, model: &ChexNet<B>) -> Result<()> {
        for callback in &mut self.callbacks {
            callback.on_epoch_end(logs, model)?;
        }
        Ok(())
    }

    pub fn on_train_end(&mut self, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_train_end(state);
        }
    }
}

impl<B: Backend> Default for CallbackManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Saves the model whenever validation loss improves
pub struct ModelCheckpointCallback {
    path: PathBuf,
    best: f64,
}

impl ModelCheckpointCallback {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            best: f64::INFINITY,
        }
    }
}

impl<B: Backend> TrainingCallback<B> for ModelCheckpointCallback {
    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &ChexNet<B>) -> Result<()> {
        if !(logs.val_loss.is_finite() && logs.val_loss < self.best) {
            debug!(
                "val_loss {:.5} did not improve from {:.5}",
                logs.val_loss, self.best
            );
            return Ok(());
        }

        let written = checkpoint::save_weights(model, &self.path)?;
        info!(
            "Epoch {}: val_loss improved from {:.5} to {:.5}, saved {:?}",
            logs.epoch + 1,
            self.best,
            logs.val_loss,
            written
        );
        self.best = logs.val_loss;
        Ok(())
    }
}

/// Per-class validation AUROC, tracking the best mean across runs
///
/// On a new best the weights are saved as `best_<name>`, the statistics
/// sidecar is rewritten and a line is appended to `best_auroc.log`.
pub struct MultiClassAurocCallback {
    class_names: Vec<String>,
    output_dir: PathBuf,
    best_weights_path: PathBuf,
    stats: TrainingStats,
    history: Vec<Vec<f64>>,
}

impl MultiClassAurocCallback {
    pub fn new<P: AsRef<Path>>(
        class_names: &[String],
        output_dir: P,
        best_weights_name: &str,
        stats: TrainingStats,
    ) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        Self {
            class_names: class_names.to_vec(),
            best_weights_path: output_dir.join(best_weights_name),
            output_dir,
            stats,
            history: Vec::new(),
        }
    }

    pub fn best_mean_auroc(&self) -> Option<f64> {
        self.stats.best_mean_auroc
    }

    /// Per-class AUROC of every epoch seen so far
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }

    fn append_log(&self, epoch: usize, mean: f64, lr: f64) -> Result<()> {
        let path = self.output_dir.join(BEST_AUROC_LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ChexNetError::io(&path, e))?;
        writeln!(file, "(epoch#{}) auroc: {}, lr: {}", epoch + 1, mean, lr)
            .map_err(|e| ChexNetError::io(&path, e))
    }
}

impl<B: Backend> TrainingCallback<B> for MultiClassAurocCallback {
    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &ChexNet<B>) -> Result<()> {
        let scores = per_class_auroc(&logs.val_scores, &logs.val_labels, logs.num_classes);

        info!("*** epoch#{} dev auroc ***", logs.epoch + 1);
        for (i, (name, score)) in self.class_names.iter().zip(&scores).enumerate() {
            info!("{}. {}: {:.4}", i + 1, name, score);
        }
        let mean = nan_mean(&scores);
        info!("mean auroc: {:.4}", mean);
        self.history.push(scores);

        if mean.is_nan() {
            return Ok(());
        }
        let improved = match self.stats.best_mean_auroc {
            Some(best) => mean > best,
            None => true,
        };
        if !improved {
            return Ok(());
        }

        info!(
            "update best auroc from {:?} to {:.4}",
            self.stats.best_mean_auroc, mean
        );
        let written = checkpoint::save_weights(model, &self.best_weights_path)?;
        self.stats.best_mean_auroc = Some(mean);
        self.stats.lr = Some(logs.lr);
        self.stats.epoch = Some(logs.epoch + 1);
        self.stats.save(&self.output_dir)?;
        self.append_log(logs.epoch, mean, logs.lr)?;
        info!("Saved best weights to {:?}", written);
        Ok(())
    }
}

/// Progress logging callback
pub struct ProgressLoggerCallback {
    log_frequency: usize,
    epochs: usize,
}

impl ProgressLoggerCallback {
    pub fn new(log_frequency: usize) -> Self {
        Self {
            log_frequency: log_frequency.max(1),
            epochs: 0,
        }
    }
}

impl<B: Backend> TrainingCallback<B> for ProgressLoggerCallback {
    fn on_train_begin(&mut self, epochs: usize) {
        self.epochs = epochs;
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, _model: &ChexNet<B>) -> Result<()> {
        if (logs.epoch + 1) % self.log_frequency == 0 {
            info!(
                "Epoch {}/{} - loss: {:.4}, val_loss: {:.4}, lr: {:.2e}",
                logs.epoch + 1,
                self.epochs,
                logs.train_loss,
                logs.val_loss,
                logs.lr
            );
        }
        Ok(())
    }
}

/// Timer callback that tracks training time
pub struct TimerCallback {
    start_time: Option<Instant>,
    epoch_start: Option<Instant>,
}

impl TimerCallback {
    pub fn new() -> Self {
        Self {
            start_time: None,
            epoch_start: None,
        }
    }
}

impl Default for TimerCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> TrainingCallback<B> for TimerCallback {
    fn on_train_begin(&mut self, epochs: usize) {
        self.start_time = Some(Instant::now());
        info!("Training started for {} epochs", epochs);
    }

    fn on_epoch_begin(&mut self, _epoch: usize) {
        self.epoch_start = Some(Instant::now());
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, _model: &ChexNet<B>) -> Result<()> {
        if let Some(start) = self.epoch_start.take() {
            debug!(
                "Epoch {} took {}",
                logs.epoch + 1,
                format_duration(start.elapsed().as_secs_f64())
            );
        }
        Ok(())
    }

    fn on_train_end(&mut self, state: &TrainingState) {
        if let Some(start) = self.start_time {
            info!(
                "Training completed in {} ({} epochs)",
                format_duration(start.elapsed().as_secs_f64()),
                state.epoch
            );
        }
    }
}
