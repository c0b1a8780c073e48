use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Residual network built from basic (two 3x3 conv) blocks
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Basic blocks per stage; channels double and resolution halves after the first stage
    pub layers: Vec<usize>,

    /// Channels of the first stage
    #[config(default = "64")]
    pub base_width: usize,

    #[config(default = "3")]
    pub input_channels: usize,
}

impl ResNetConfig {
    pub fn resnet18() -> Self {
        Self::new(vec![2, 2, 2, 2])
    }

    pub fn out_channels(&self) -> usize {
        self.base_width << self.layers.len().saturating_sub(1)
    }

    pub fn reduction(&self) -> usize {
        4 << self.layers.len().saturating_sub(1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let stem = Conv2dConfig::new([self.input_channels, self.base_width], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);

        let mut blocks = Vec::new();
        let mut in_channels = self.base_width;
        for (stage, &count) in self.layers.iter().enumerate() {
            let out_channels = self.base_width << stage;
            for i in 0..count {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(in_channels, out_channels, stride, device));
                in_channels = out_channels;
            }
        }

        ResNet {
            stem,
            stem_norm: BatchNormConfig::new(self.base_width).init(device),
            stem_pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            blocks,
        }
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem: Conv2d<B>,
    stem_norm: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> ResNet<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.stem_norm.forward(self.stem.forward(input)));
        let mut x = self.stem_pool.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm1: BatchNormConfig::new(out_channels).init(device),
            conv2: Conv2dConfig::new([out_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(out_channels).init(device),
            downsample,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = relu(self.norm1.forward(self.conv1.forward(x)));
        let out = self.norm2.forward(self.conv2.forward(out));
        relu(out + identity)
    }
}

/// 1x1 projection on the skip path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resnet18_shape_math() {
        let config = ResNetConfig::resnet18();
        assert_eq!(config.out_channels(), 512);
        assert_eq!(config.reduction(), 32);
    }

    #[test]
    fn test_small_resnet_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let config = ResNetConfig::new(vec![1, 1]).with_base_width(4);
        let model = config.init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 16], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, 8, 2, 2]);
    }
}
