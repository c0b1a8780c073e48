pub mod callbacks;
pub mod class_weights;
pub mod metrics;
pub mod plan;
pub mod scheduler;
pub mod steps;
pub mod trainer;

pub use class_weights::{get_class_weights, ClassWeight, ClassWeights};
pub use plan::RunPlan;
pub use steps::resolve_steps;
pub use trainer::{Trainer, TrainerConfig};

use std::path::PathBuf;

/// Everything measured over one epoch
#[derive(Debug, Clone, Default)]
pub struct EpochLogs {
    /// Zero-based epoch index
    pub epoch: usize,
    /// Mean weighted training loss; NaN when no step ran
    pub train_loss: f64,
    /// Mean unweighted validation loss; NaN when no step ran
    pub val_loss: f64,
    /// Learning rate used during the epoch
    pub lr: f64,
    /// Validation probabilities, row-major `[samples, classes]`
    pub val_scores: Vec<f32>,
    /// Validation labels matching `val_scores`
    pub val_labels: Vec<f32>,
    pub num_classes: usize,
}

/// Training state
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Completed epochs
    pub epoch: usize,
    /// Optimizer steps taken
    pub global_step: usize,
    pub train_loss_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    pub lr_history: Vec<f64>,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished epoch
    pub fn update_epoch(&mut self, logs: &EpochLogs) {
        self.epoch = logs.epoch + 1;
        self.train_loss_history.push(logs.train_loss);
        self.val_loss_history.push(logs.val_loss);
        self.lr_history.push(logs.lr);
    }

    /// Lowest finite validation loss seen so far
    pub fn best_val_loss(&self) -> Option<f64> {
        self.val_loss_history
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .reduce(f64::min)
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final training state
    pub state: TrainingState,
    /// Best mean validation AUROC, including earlier runs
    pub best_mean_auroc: Option<f64>,
    /// Weights with the best mean AUROC, when any were saved
    pub best_weights: Option<PathBuf>,
    /// Training duration in seconds
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tracks_history() {
        let mut state = TrainingState::new();
        for (epoch, val_loss) in [0.7, f64::NAN, 0.5, 0.6].into_iter().enumerate() {
            state.update_epoch(&EpochLogs {
                epoch,
                train_loss: 1.0,
                val_loss,
                lr: 0.001,
                ..Default::default()
            });
        }
        assert_eq!(state.epoch, 4);
        assert_eq!(state.lr_history.len(), 4);
        assert_eq!(state.best_val_loss(), Some(0.5));
    }
}
