use crate::model::densenet::{DenseNet, DenseNetConfig};
use crate::model::resnet::{ResNet, ResNetConfig};
use crate::model::{BaseModel, ModelConfig};
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::record::CompactRecorder;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::path::Path;

/// Multi-label chest X-ray classifier
///
/// Exactly one of `densenet`/`resnet` is populated; the head is a global
/// average pool followed by one linear unit per class.
#[derive(Module, Debug)]
pub struct ChexNet<B: Backend> {
    densenet: Option<DenseNet<B>>,
    resnet: Option<ResNet<B>>,
    pool: AdaptiveAvgPool2d,
    classifier: Linear<B>,
}

impl<B: Backend> ChexNet<B> {
    /// Build around a DenseNet backbone
    pub fn with_densenet(config: &DenseNetConfig, num_classes: usize, device: &B::Device) -> Self {
        Self {
            densenet: Some(config.init(device)),
            resnet: None,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(config.out_channels(), num_classes).init(device),
        }
    }

    /// Build around a ResNet backbone
    pub fn with_resnet(config: &ResNetConfig, num_classes: usize, device: &B::Device) -> Self {
        Self {
            densenet: None,
            resnet: Some(config.init(device)),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(config.out_channels(), num_classes).init(device),
        }
    }

    /// Pooled backbone features `[batch, channels]`
    pub fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let maps = match (&self.densenet, &self.resnet) {
            (Some(backbone), _) => backbone.forward(input),
            (None, Some(backbone)) => backbone.forward(input),
            (None, None) => input,
        };
        let [batch, channels, _, _] = maps.dims();
        self.pool.forward(maps).reshape([batch, channels])
    }

    /// Per-class logits `[batch, classes]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.classifier.forward(self.features(input))
    }

    /// Independent per-class probabilities
    pub fn predict(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(input))
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.weight.val().dims()[1]
    }

    pub fn feature_width(&self) -> usize {
        self.classifier.weight.val().dims()[0]
    }

    pub fn base_model(&self) -> Option<BaseModel> {
        match (&self.densenet, &self.resnet) {
            (Some(_), _) => Some(BaseModel::DenseNet121),
            (None, Some(_)) => Some(BaseModel::ResNet18),
            (None, None) => None,
        }
    }

    /// Human readable overview of the network
    pub fn summary(&self, input_shape: (usize, usize, usize)) -> String {
        let (height, width, channels) = input_shape;
        let backbone = self.base_model().map(|m| m.name()).unwrap_or("none");
        let mut out = String::new();
        out.push_str(&format!("Model: ChexNet ({backbone})\n"));
        out.push_str(&format!("  input:      [{channels}, {height}, {width}]\n"));
        out.push_str(&format!("  features:   {}\n", self.feature_width()));
        out.push_str(&format!("  classes:    {}\n", self.num_classes()));
        out.push_str(&format!("  parameters: {}\n", self.num_params()));
        out
    }

    /// Replace the backbone with weights recorded by [`save_backbone`](Self::save_backbone)
    pub fn load_backbone(
        mut self,
        path: &Path,
        device: &B::Device,
    ) -> Result<Self, burn::record::RecorderError> {
        let recorder = CompactRecorder::new();
        if let Some(backbone) = self.densenet.take() {
            self.densenet = Some(backbone.load_file(path.to_path_buf(), &recorder, device)?);
        } else if let Some(backbone) = self.resnet.take() {
            self.resnet = Some(backbone.load_file(path.to_path_buf(), &recorder, device)?);
        }
        Ok(self)
    }

    /// Record only the backbone, in the layout [`load_backbone`](Self::load_backbone) reads
    pub fn save_backbone(&self, path: &Path) -> Result<(), burn::record::RecorderError> {
        let recorder = CompactRecorder::new();
        if let Some(backbone) = &self.densenet {
            backbone.clone().save_file(path.to_path_buf(), &recorder)?;
        } else if let Some(backbone) = &self.resnet {
            backbone.clone().save_file(path.to_path_buf(), &recorder)?;
        }
        Ok(())
    }
}

/// Initialize a full-size model from configuration
pub fn init_model<B: Backend>(config: &ModelConfig, device: &B::Device) -> ChexNet<B> {
    match config.base_model {
        BaseModel::DenseNet121 => ChexNet::with_densenet(
            &DenseNetConfig::densenet121().with_input_channels(config.input_channels),
            config.num_classes,
            device,
        ),
        BaseModel::ResNet18 => ChexNet::with_resnet(
            &ResNetConfig::resnet18().with_input_channels(config.input_channels),
            config.num_classes,
            device,
        ),
    }
}
