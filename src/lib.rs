//! # CheXNet: multi-label chest X-ray classifier training
//!
//! Reads an INI configuration, prepares an experiment directory and trains
//! a DenseNet-121 (or ResNet-18) classifier with one sigmoid output per
//! finding.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use chexnet::config::TrainConfig;
//! use chexnet::model::ModelFactory;
//! use chexnet::training::RunPlan;
//! use chexnet::DefaultBackend;
//!
//! let config = TrainConfig::from_file("./sample_config.ini").unwrap();
//! let plan = RunPlan::from_config(&config, &config.dataset_csv_dir).unwrap();
//! plan.log();
//!
//! let device = Default::default();
//! let model = ModelFactory::new(&config.base_model_weights_dir)
//!     .get_model::<DefaultBackend>(
//!         &config.class_names,
//!         &config.base_model_name,
//!         config.input_shape(),
//!         config.use_base_model_weights,
//!         config.model_weights_file().as_deref(),
//!         &device,
//!     )
//!     .unwrap();
//! println!("{}", model.summary(config.input_shape()));
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used for training
pub type TrainBackend = Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use config::TrainConfig;
pub use data::{AugmentedImageSequence, SampleCounts};
pub use error::{ChexNetError, Result};
pub use model::{ChexNet, ModelFactory};
pub use training::{ClassWeights, RunPlan, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - multi-label chest X-ray classifier training",
        NAME, VERSION
    )
}
