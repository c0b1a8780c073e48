pub mod augment;
pub mod loader;
pub mod sequence;
pub mod stats;

pub use augment::Augmenter;
pub use loader::DatasetLoader;
pub use sequence::{AugmentedImageSequence, ImageBatch, SequenceConfig};
pub use stats::{get_sample_counts, SampleCounts};

/// Column holding the image file name in the split CSVs
pub const IMAGE_ID_COLUMN: &str = "Image Index";

/// ImageNet channel means used to normalise inputs for the pretrained backbones
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One row of a split CSV
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    /// Image file name, relative to the image source directory
    pub image_id: String,
    /// One 0/1 entry per configured class, in class order
    pub labels: Vec<u8>,
}

impl LabeledImage {
    /// Whether the sample is positive for the class at `index`
    pub fn is_positive(&self, index: usize) -> bool {
        self.labels.get(index).copied() == Some(1)
    }
}
