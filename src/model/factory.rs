use crate::error::{ChexNetError, Result};
use crate::model::architecture::ChexNet;
use crate::model::checkpoint::{load_weights, weights_file};
use crate::model::{BaseModel, ModelConfig};
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Smallest side the five stride-2 stages can reduce to a 1x1 map
pub const MIN_INPUT_SIZE: usize = 32;

/// Builds classifiers for the configured backbone
#[derive(Debug, Clone)]
pub struct ModelFactory {
    base_weights_dir: PathBuf,
}

impl ModelFactory {
    pub fn new(base_weights_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_weights_dir: base_weights_dir.into(),
        }
    }

    /// File holding pretrained backbone weights for `base_model`
    pub fn base_weights_path(&self, base_model: BaseModel) -> PathBuf {
        weights_file(&self.base_weights_dir.join(base_model.name()))
    }

    /// Build a model with one sigmoid output per class
    ///
    /// `input_shape` is `(height, width, channels)`. When `weights_path` is
    /// set the whole model is restored from it and base weights are not read.
    pub fn get_model<B: Backend>(
        &self,
        class_names: &[String],
        base_model_name: &str,
        input_shape: (usize, usize, usize),
        use_base_weights: bool,
        weights_path: Option<&Path>,
        device: &B::Device,
    ) -> Result<ChexNet<B>> {
        let base_model = BaseModel::from_name(base_model_name).ok_or_else(|| {
            ChexNetError::Configuration {
                path: PathBuf::from(base_model_name),
                reason: format!(
                    "unknown base_model_name '{base_model_name}', expected DenseNet121 or ResNet18"
                ),
            }
        })?;

        if class_names.is_empty() {
            return Err(ChexNetError::invalid("class_names", "", "at least one class name"));
        }

        let (height, width, channels) = input_shape;
        if channels != 3 {
            return Err(ChexNetError::invalid(
                "input_shape",
                format!("({height}, {width}, {channels})"),
                "three input channels",
            ));
        }
        if height < MIN_INPUT_SIZE || width < MIN_INPUT_SIZE {
            return Err(ChexNetError::invalid(
                "image_dimension",
                format!("{}", height.min(width)),
                "a size of at least 32",
            ));
        }

        let config = ModelConfig::new(class_names.len(), base_model).with_input_channels(channels);
        let model = config.init::<B>(device);
        debug!(
            "Built {} with {} outputs for {}x{} input",
            base_model.name(),
            class_names.len(),
            height,
            width
        );

        if let Some(path) = weights_path {
            info!("Loading model weights from {:?}", weights_file(path));
            return load_weights(model, path, device);
        }

        if use_base_weights {
            let path = self.base_weights_path(base_model);
            if !path.is_file() {
                return Err(ChexNetError::weights(&path, "base model weights not found"));
            }
            info!("Loading {} base weights from {:?}", base_model.name(), path);
            return model
                .load_backbone(&path, device)
                .map_err(|e| ChexNetError::weights(&path, e.to_string()));
        }

        Ok(model)
    }
}

impl Default for ModelFactory {
    fn default() -> Self {
        Self::new("base_models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::checkpoint::save_weights;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unknown_base_model() {
        let factory = ModelFactory::default();
        let err = factory
            .get_model::<TestBackend>(
                &classes(&["Atelectasis"]),
                "InceptionV3",
                (224, 224, 3),
                false,
                None,
                &Default::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ChexNetError::Configuration { .. }));
    }

    #[test]
    fn test_rejects_grayscale_and_tiny_inputs() {
        let factory = ModelFactory::default();
        let names = classes(&["Atelectasis"]);
        let device = Default::default();

        let err = factory
            .get_model::<TestBackend>(&names, "ResNet18", (224, 224, 1), false, None, &device)
            .unwrap_err();
        assert!(matches!(err, ChexNetError::InvalidConfigurationValue { .. }));

        let err = factory
            .get_model::<TestBackend>(&names, "ResNet18", (16, 16, 3), false, None, &device)
            .unwrap_err();
        assert!(matches!(err, ChexNetError::InvalidConfigurationValue { .. }));
    }

    #[test]
    fn test_fresh_model_has_one_output_per_class() {
        let factory = ModelFactory::default();
        let model = factory
            .get_model::<TestBackend>(
                &classes(&["Atelectasis", "Cardiomegaly", "Effusion"]),
                "resnet18",
                (32, 32, 3),
                false,
                None,
                &Default::default(),
            )
            .unwrap();
        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.base_model(), Some(BaseModel::ResNet18));
    }

    #[test]
    fn test_missing_base_weights() {
        let dir = TempDir::new().unwrap();
        let factory = ModelFactory::new(dir.path());
        let err = factory
            .get_model::<TestBackend>(
                &classes(&["Atelectasis"]),
                "ResNet18",
                (32, 32, 3),
                true,
                None,
                &Default::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ChexNetError::WeightsLoad { .. }));
    }

    #[test]
    fn test_trained_weights_with_wrong_class_count() {
        let dir = TempDir::new().unwrap();
        let factory = ModelFactory::new(dir.path());
        let device = Default::default();

        let two = factory
            .get_model::<TestBackend>(
                &classes(&["A", "B"]),
                "ResNet18",
                (32, 32, 3),
                false,
                None,
                &device,
            )
            .unwrap();
        let path = dir.path().join("weights.h5");
        save_weights(&two, &path).unwrap();

        let restored = factory
            .get_model::<TestBackend>(
                &classes(&["A", "B"]),
                "ResNet18",
                (32, 32, 3),
                false,
                Some(&path),
                &device,
            )
            .unwrap();
        assert_eq!(restored.num_classes(), 2);

        let err = factory
            .get_model::<TestBackend>(
                &classes(&["A", "B", "C"]),
                "ResNet18",
                (32, 32, 3),
                false,
                Some(&path),
                &device,
            )
            .unwrap_err();
        assert!(matches!(err, ChexNetError::WeightsLoad { .. }));
    }

    #[test]
    fn test_trained_weights_from_other_base_model() {
        let dir = TempDir::new().unwrap();
        let factory = ModelFactory::new(dir.path());
        let device = Default::default();
        let names = classes(&["A", "B"]);

        let resnet = factory
            .get_model::<TestBackend>(&names, "ResNet18", (32, 32, 3), false, None, &device)
            .unwrap();
        let path = dir.path().join("w.h5");
        save_weights(&resnet, &path).unwrap();

        let err = factory
            .get_model::<TestBackend>(&names, "DenseNet121", (32, 32, 3), false, Some(&path), &device)
            .unwrap_err();
        match err {
            ChexNetError::WeightsLoad { reason, .. } => {
                assert!(reason.contains("different base model"), "{reason}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_base_weights_round_trip() {
        let dir = TempDir::new().unwrap();
        let factory = ModelFactory::new(dir.path());
        let device = Default::default();
        let names = classes(&["A"]);

        let donor = factory
            .get_model::<TestBackend>(&names, "ResNet18", (32, 32, 3), false, None, &device)
            .unwrap();
        donor
            .save_backbone(&factory.base_weights_path(BaseModel::ResNet18))
            .unwrap();

        let model = factory
            .get_model::<TestBackend>(&names, "ResNet18", (32, 32, 3), true, None, &device)
            .unwrap();
        assert_eq!(model.num_classes(), 1);
    }
}
