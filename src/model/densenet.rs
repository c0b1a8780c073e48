//! Densely connected convolutional network (Huang et al., 2017).
//!
//! Every layer of a dense block sees the concatenation of all earlier
//! feature maps in that block; transitions halve channels and resolution.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// DenseNet backbone configuration
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Number of layers in each dense block
    pub block_config: Vec<usize>,

    /// Channels added by every dense layer
    #[config(default = "32")]
    pub growth_rate: usize,

    /// Channels produced by the stem convolution
    #[config(default = "64")]
    pub num_init_features: usize,

    /// Bottleneck width multiplier (bottleneck = bn_size * growth_rate)
    #[config(default = "4")]
    pub bn_size: usize,

    #[config(default = "3")]
    pub input_channels: usize,
}

impl DenseNetConfig {
    /// The 121-layer variant used by CheXNet
    pub fn densenet121() -> Self {
        Self::new(vec![6, 12, 24, 16])
    }

    /// Channels of the final feature map
    pub fn out_channels(&self) -> usize {
        let mut features = self.num_init_features;
        for (i, &layers) in self.block_config.iter().enumerate() {
            features += layers * self.growth_rate;
            if i + 1 != self.block_config.len() {
                features /= 2;
            }
        }
        features
    }

    /// Spatial downsampling between input and final feature map
    pub fn reduction(&self) -> usize {
        // stem conv and max pool, then one transition between blocks
        4 << self.block_config.len().saturating_sub(1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        let stem = Conv2dConfig::new([self.input_channels, self.num_init_features], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let stem_norm = BatchNormConfig::new(self.num_init_features).init(device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::with_capacity(self.block_config.len());
        let mut transitions = Vec::new();
        let mut features = self.num_init_features;

        for (i, &layers) in self.block_config.iter().enumerate() {
            blocks.push(DenseBlock::new(
                layers,
                features,
                self.bn_size,
                self.growth_rate,
                device,
            ));
            features += layers * self.growth_rate;

            if i + 1 != self.block_config.len() {
                transitions.push(Transition::new(features, features / 2, device));
                features /= 2;
            }
        }

        DenseNet {
            stem,
            stem_norm,
            stem_pool,
            blocks,
            transitions,
            final_norm: BatchNormConfig::new(features).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    stem: Conv2d<B>,
    stem_norm: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    blocks: Vec<DenseBlock<B>>,
    transitions: Vec<Transition<B>>,
    final_norm: BatchNorm<B, 2>,
}

impl<B: Backend> DenseNet<B> {
    /// Feature map `[batch, out_channels, h / reduction, w / reduction]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(input);
        let x = relu(self.stem_norm.forward(x));
        let mut x = self.stem_pool.forward(x);

        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if let Some(transition) = self.transitions.get(i) {
                x = transition.forward(x);
            }
        }

        relu(self.final_norm.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    norm1: BatchNorm<B, 2>,
    conv1: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
}

impl<B: Backend> DenseLayer<B> {
    fn new(in_channels: usize, bn_size: usize, growth_rate: usize, device: &B::Device) -> Self {
        let bottleneck = bn_size * growth_rate;
        Self {
            norm1: BatchNormConfig::new(in_channels).init(device),
            conv1: Conv2dConfig::new([in_channels, bottleneck], [1, 1])
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(bottleneck).init(device),
            conv2: Conv2dConfig::new([bottleneck, growth_rate], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
        }
    }

    /// New feature maps only; the block concatenates them
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(relu(self.norm1.forward(x)));
        self.conv2.forward(relu(self.norm2.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlock<B> {
    fn new(
        num_layers: usize,
        in_channels: usize,
        bn_size: usize,
        growth_rate: usize,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|i| DenseLayer::new(in_channels + i * growth_rate, bn_size, growth_rate, device))
            .collect();
        Self { layers }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut features = x;
        for layer in &self.layers {
            let new_features = layer.forward(features.clone());
            features = Tensor::cat(vec![features, new_features], 1);
        }
        features
    }
}

#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    norm: BatchNorm<B, 2>,
    conv: Conv2d<B>,
    pool: AvgPool2d,
}

impl<B: Backend> Transition<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            norm: BatchNormConfig::new(in_channels).init(device),
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(relu(self.norm.forward(x)));
        self.pool.forward(x)
    }
}
