pub mod architecture;
pub mod checkpoint;
pub mod densenet;
pub mod factory;
pub mod loss;
pub mod resnet;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

pub use architecture::ChexNet;
pub use factory::ModelFactory;

/// Supported convolutional backbones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseModel {
    DenseNet121,
    ResNet18,
}

impl BaseModel {
    /// Resolve a configured name, ignoring case and separators
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "densenet121" => Some(Self::DenseNet121),
            "resnet18" => Some(Self::ResNet18),
            _ => None,
        }
    }

    /// Canonical name, also the file stem of pretrained backbone weights
    pub fn name(&self) -> &'static str {
        match self {
            Self::DenseNet121 => "DenseNet121",
            Self::ResNet18 => "ResNet18",
        }
    }
}

/// Model configuration
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// One sigmoid output per class
    pub num_classes: usize,

    /// Backbone architecture
    pub base_model: BaseModel,

    /// Input channels; the image sequences always emit RGB
    #[config(default = "3")]
    pub input_channels: usize,
}

impl ModelConfig {
    /// Initialize a model with fresh weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> ChexNet<B> {
        architecture::init_model(self, device)
    }
}
