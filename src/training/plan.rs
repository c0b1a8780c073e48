use crate::config::TrainConfig;
use crate::data::{get_sample_counts, SampleCounts};
use crate::error::Result;
use crate::training::{get_class_weights, resolve_steps, ClassWeights};
use std::path::Path;
use tracing::info;

/// Sample counts, step counts and class weights for one launch
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub train_counts: SampleCounts,
    pub validation_counts: SampleCounts,
    pub train_steps: usize,
    pub validation_steps: usize,
    pub class_weights: ClassWeights,
}

impl RunPlan {
    /// Read `train.csv` and `validation.csv` from `splits_dir` and derive the plan
    pub fn from_config(config: &TrainConfig, splits_dir: &Path) -> Result<Self> {
        let train_counts = get_sample_counts(splits_dir, "train", &config.class_names)?;
        let validation_counts = get_sample_counts(splits_dir, "validation", &config.class_names)?;

        let train_steps = resolve_steps(
            "train_steps",
            &config.train_steps,
            train_counts.total,
            config.batch_size,
        )?;
        let validation_steps = resolve_steps(
            "validation_steps",
            &config.validation_steps,
            validation_counts.total,
            config.batch_size,
        )?;

        let class_weights = get_class_weights(&train_counts, config.positive_weights_multiply)?;

        Ok(Self {
            train_counts,
            validation_counts,
            train_steps,
            validation_steps,
            class_weights,
        })
    }

    pub fn log(&self) {
        info!("** train_steps: {} **", self.train_steps);
        info!("** validation_steps: {} **", self.validation_steps);
        info!(
            "** train samples: {}, validation samples: {} **",
            self.train_counts.total, self.validation_counts.total
        );
        info!("** class_weights **\n{}", self.class_weights);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChexNetError;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir, train_steps: &str) -> TrainConfig {
        let text = format!(
            "[DEFAULT]\n\
             output_directory = {}\n\
             image_source_directory = images\n\
             base_model_name = DenseNet121\n\
             class_names = Atelectasis,Cardiomegaly\n\
             [TRAIN]\n\
             use_base_model_weights = false\n\
             use_trained_model_weights = false\n\
             use_best_weights = false\n\
             show_model_summary = false\n\
             output_weights_name = weights.h5\n\
             epochs = 1\n\
             batch_size = 2\n\
             initial_learning_rate = 0.001\n\
             generator_workers = 1\n\
             image_dimension = 32\n\
             patience_reduce_lr = 1\n\
             min_learning_rate = 1e-8\n\
             train_steps = {train_steps}\n\
             validation_steps = 1\n\
             positive_weights_multiply = 1\n\
             dataset_csv_dir = {}\n",
            dir.path().display(),
            dir.path().display()
        );
        TrainConfig::from_ini_str(&text, "test.ini").unwrap()
    }

    fn write_splits(dir: &TempDir) {
        let csv = "Image Index,Atelectasis,Cardiomegaly\n\
                   a.png,1,0\nb.png,0,1\nc.png,0,0\nd.png,1,1\ne.png,0,0\n";
        std::fs::write(dir.path().join("train.csv"), csv).unwrap();
        std::fs::write(dir.path().join("validation.csv"), csv).unwrap();
    }

    #[test]
    fn test_plan_from_splits() {
        let dir = TempDir::new().unwrap();
        write_splits(&dir);

        let plan = RunPlan::from_config(&config_for(&dir, "auto"), dir.path()).unwrap();
        assert_eq!(plan.train_counts.total, 5);
        assert_eq!(plan.train_counts.positive_for("Atelectasis"), Some(2));
        assert_eq!(plan.train_steps, 2);
        assert_eq!(plan.validation_steps, 1);

        let w = plan.class_weights.get("Cardiomegaly").unwrap();
        assert!((w.positive - 2.5).abs() < 1e-12);
        assert!((w.negative - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_plan_rejects_bad_steps() {
        let dir = TempDir::new().unwrap();
        write_splits(&dir);

        let err = RunPlan::from_config(&config_for(&dir, "abc"), dir.path()).unwrap_err();
        assert!(matches!(err, ChexNetError::InvalidConfigurationValue { .. }));
    }
}
