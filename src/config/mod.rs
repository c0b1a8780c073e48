//! INI configuration for a training run.
//!
//! The file carries a `DEFAULT` section (paths, model and class names) and a
//! `TRAIN` section (everything that drives the optimisation). A key missing
//! from `TRAIN` is looked up in `DEFAULT` and then in the section-less
//! preamble, the same inheritance configparser applies.

use crate::error::{ChexNetError, Result};
use ini::{Ini, ParseOption};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "./sample_config.ini";

const DEFAULT_SECTION: &str = "DEFAULT";
const TRAIN_SECTION: &str = "TRAIN";

/// Typed view over the recognised configuration keys
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Where weights, logs, copied CSVs and statistics are written
    pub output_directory: PathBuf,
    /// Directory the image ids in the CSV files are resolved against
    pub image_source_directory: PathBuf,
    /// Backbone architecture, e.g. `DenseNet121`
    pub base_model_name: String,
    /// Ordered class names; one sigmoid output per entry
    pub class_names: Vec<String>,

    pub use_base_model_weights: bool,
    pub use_trained_model_weights: bool,
    pub use_best_weights: bool,
    pub show_model_summary: bool,
    pub output_weights_name: String,

    pub epochs: usize,
    pub batch_size: usize,
    pub generator_workers: usize,
    pub image_dimension: usize,
    pub patience_reduce_lr: usize,

    pub initial_learning_rate: f64,
    pub min_learning_rate: f64,
    pub positive_weights_multiply: f64,

    /// `auto` or an integer literal, resolved later against the sample count
    pub train_steps: String,
    /// `auto` or an integer literal, resolved later against the sample count
    pub validation_steps: String,

    /// Directory holding `train.csv` and `validation.csv`
    pub dataset_csv_dir: PathBuf,

    /// Directory holding pretrained backbone files `<base_model_name>.mpk`
    pub base_model_weights_dir: PathBuf,
    /// Shuffle seed for the training sequence
    pub seed: u64,
    /// Multiplier applied to the learning rate on a plateau
    pub lr_reduce_factor: f64,
}

impl TrainConfig {
    /// Load configuration from an INI file on disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ChexNetError::Configuration {
            path: path.to_path_buf(),
            reason: format!("cannot read configuration file: {e}"),
        })?;
        Self::from_ini_str(&text, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn from_ini_str<P: AsRef<Path>>(text: &str, origin: P) -> Result<Self> {
        let origin = origin.as_ref();
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options).map_err(|e| {
            ChexNetError::Configuration {
                path: origin.to_path_buf(),
                reason: format!("malformed INI: {e}"),
            }
        })?;

        let reader = SectionReader { ini: &ini, origin };

        let config = Self {
            output_directory: reader.path(DEFAULT_SECTION, "output_directory")?,
            image_source_directory: reader.path(DEFAULT_SECTION, "image_source_directory")?,
            base_model_name: reader.string(DEFAULT_SECTION, "base_model_name")?,
            class_names: parse_class_names(&reader.string(DEFAULT_SECTION, "class_names")?),

            use_base_model_weights: reader.boolean(TRAIN_SECTION, "use_base_model_weights")?,
            use_trained_model_weights: reader.boolean(TRAIN_SECTION, "use_trained_model_weights")?,
            use_best_weights: reader.boolean(TRAIN_SECTION, "use_best_weights")?,
            show_model_summary: reader.boolean(TRAIN_SECTION, "show_model_summary")?,
            output_weights_name: reader.string(TRAIN_SECTION, "output_weights_name")?,

            epochs: reader.integer(TRAIN_SECTION, "epochs")?,
            batch_size: reader.integer(TRAIN_SECTION, "batch_size")?,
            generator_workers: reader.integer(TRAIN_SECTION, "generator_workers")?,
            image_dimension: reader.integer(TRAIN_SECTION, "image_dimension")?,
            patience_reduce_lr: reader.integer_with_alias(
                TRAIN_SECTION,
                "patience_reduce_lr",
                "reduce_learning_rate",
            )?,

            initial_learning_rate: reader.float(TRAIN_SECTION, "initial_learning_rate")?,
            min_learning_rate: reader.float(TRAIN_SECTION, "min_learning_rate")?,
            positive_weights_multiply: reader.float(TRAIN_SECTION, "positive_weights_multiply")?,

            train_steps: reader.string(TRAIN_SECTION, "train_steps")?,
            validation_steps: reader.string(TRAIN_SECTION, "validation_steps")?,

            dataset_csv_dir: reader.path(TRAIN_SECTION, "dataset_csv_dir")?,

            base_model_weights_dir: reader
                .optional(DEFAULT_SECTION, "base_model_weights_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("base_models")),
            seed: match reader.optional(TRAIN_SECTION, "seed") {
                Some(raw) => coerce(raw, "seed", "an unsigned integer")?,
                None => 1,
            },
            lr_reduce_factor: match reader.optional(TRAIN_SECTION, "lr_reduce_factor") {
                Some(raw) => coerce(raw, "lr_reduce_factor", "a floating point number")?,
                None => 0.1,
            },
        };

        debug!("Parsed configuration from {:?}: {:?}", origin, config);
        Ok(config)
    }

    /// Weights file the model should start from, if any
    ///
    /// Only set when resuming; picks the `best_` checkpoint when requested.
    pub fn model_weights_file(&self) -> Option<PathBuf> {
        if !self.use_trained_model_weights {
            return None;
        }
        let name = if self.use_best_weights {
            self.best_weights_name()
        } else {
            self.output_weights_name.clone()
        };
        Some(self.output_directory.join(name))
    }

    /// File name of the checkpoint holding the best mean AUROC weights
    pub fn best_weights_name(&self) -> String {
        format!("best_{}", self.output_weights_name)
    }

    /// Input shape as (height, width, channels)
    pub fn input_shape(&self) -> (usize, usize, usize) {
        (self.image_dimension, self.image_dimension, 3)
    }
}

/// Split a comma-delimited class list, keeping order
pub fn parse_class_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Coerce a boolean the way configparser does
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn coerce<T: std::str::FromStr>(raw: &str, key: &str, expected: &'static str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ChexNetError::invalid(key, raw, expected))
}

struct SectionReader<'a> {
    ini: &'a Ini,
    origin: &'a Path,
}

impl<'a> SectionReader<'a> {
    fn optional(&self, section: &str, key: &str) -> Option<&'a str> {
        [Some(section), Some(DEFAULT_SECTION)]
            .into_iter()
            .filter_map(|name| self.ini.section(name))
            .chain(std::iter::once(self.ini.general_section()))
            .find_map(|props| props.get(key))
    }

    fn required(&self, section: &str, key: &str) -> Result<&'a str> {
        self.optional(section, key)
            .ok_or_else(|| ChexNetError::Configuration {
                path: self.origin.to_path_buf(),
                reason: format!("missing key '{key}' in section [{section}]"),
            })
    }

    fn string(&self, section: &str, key: &str) -> Result<String> {
        Ok(self.required(section, key)?.trim().to_string())
    }

    fn path(&self, section: &str, key: &str) -> Result<PathBuf> {
        self.string(section, key).map(PathBuf::from)
    }

    fn boolean(&self, section: &str, key: &str) -> Result<bool> {
        let raw = self.required(section, key)?;
        parse_bool(raw).ok_or_else(|| {
            ChexNetError::invalid(key, raw, "a boolean (true/false, yes/no, on/off, 1/0)")
        })
    }

    fn integer(&self, section: &str, key: &str) -> Result<usize> {
        coerce(self.required(section, key)?, key, "a non-negative integer")
    }

    fn integer_with_alias(&self, section: &str, key: &str, alias: &str) -> Result<usize> {
        match self.optional(section, key) {
            Some(raw) => coerce(raw, key, "a non-negative integer"),
            None => self.integer(section, alias),
        }
    }

    fn float(&self, section: &str, key: &str) -> Result<f64> {
        coerce(self.required(section, key)?, key, "a floating point number")
    }
}
