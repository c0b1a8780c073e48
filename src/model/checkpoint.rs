use crate::error::{ChexNetError, Result};
use crate::model::architecture::ChexNet;
use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sidecar that survives between runs in the output directory
pub const STATS_FILE: &str = ".training_stats.json";

/// Extension the compact recorder gives every weights file
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Path the recorder actually writes for `path`
pub fn weights_file(path: &Path) -> PathBuf {
    path.with_extension(WEIGHTS_EXTENSION)
}

/// Persist the full model
pub fn save_weights<B: Backend>(model: &ChexNet<B>, path: &Path) -> Result<PathBuf> {
    let target = weights_file(path);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ChexNetError::io(parent, e))?;
    }

    model
        .clone()
        .save_file(target.clone(), &CompactRecorder::new())
        .map_err(|e| ChexNetError::weights(&target, e.to_string()))?;

    debug!("Saved weights to {:?}", target);
    Ok(target)
}

/// Load full-model weights into `model`
///
/// The head of the stored model must match the class count of `model`.
pub fn load_weights<B: Backend>(
    model: ChexNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<ChexNet<B>> {
    let target = weights_file(path);
    if !target.is_file() {
        return Err(ChexNetError::weights(&target, "file not found"));
    }

    let expected_classes = model.num_classes();
    let expected_base = model.base_model();

    let loaded = model
        .load_file(target.clone(), &CompactRecorder::new(), device)
        .map_err(|e| ChexNetError::weights(&target, e.to_string()))?;

    if loaded.num_classes() != expected_classes {
        return Err(ChexNetError::weights(
            &target,
            format!(
                "stored model has {} outputs, expected {}",
                loaded.num_classes(),
                expected_classes
            ),
        ));
    }
    if loaded.base_model() != expected_base {
        return Err(ChexNetError::weights(&target, "stored model uses a different base model"));
    }

    info!("Loaded weights from {:?}", target);
    Ok(loaded)
}

/// Statistics carried across training runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_mean_auroc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<usize>,

    /// Keys written by other tools, preserved on rewrite
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TrainingStats {
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(STATS_FILE)
    }

    /// Read the sidecar; a missing file yields empty statistics
    pub fn load_or_default(output_dir: &Path) -> Result<Self> {
        let path = Self::path(output_dir);
        if !path.exists() {
            debug!("No training statistics at {:?}", path);
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path).map_err(|e| ChexNetError::io(&path, e))?;
        serde_json::from_str(&text).map_err(|source| ChexNetError::Stats { path, source })
    }

    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = Self::path(output_dir);
        let json = serde_json::to_string_pretty(self).map_err(|source| ChexNetError::Stats {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|e| ChexNetError::io(&path, e))?;
        Ok(path)
    }

    pub fn is_empty(&self) -> bool {
        self.best_mean_auroc.is_none()
            && self.lr.is_none()
            && self.epoch.is_none()
            && self.extra.is_empty()
    }
}
