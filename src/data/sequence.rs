//! Finite, restartable sequences of image batches.
//!
//! A sequence owns the rows of one split CSV and decodes images lazily, one
//! batch at a time. It yields exactly `len()` batches per epoch; indices
//! wrap around the rows so every batch holds `batch_size` samples even when
//! the step count asks for more than one pass over the split. Calling
//! [`AugmentedImageSequence::on_epoch_end`] reshuffles (when enabled) and
//! the next epoch starts again from batch 0.

use crate::data::{Augmenter, DatasetLoader, LabeledImage, IMAGENET_MEAN, IMAGENET_STD};
use crate::error::{ChexNetError, Result};
use crate::utils::random::seeded_rng;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::imageops::FilterType;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Construction parameters for an [`AugmentedImageSequence`]
#[derive(Debug, Clone)]
pub struct SequenceConfig {
    /// Split CSV with an image id column and one 0/1 column per class
    pub csv_path: PathBuf,
    pub class_names: Vec<String>,
    /// Directory image ids are resolved against
    pub source_image_dir: PathBuf,
    pub batch_size: usize,
    /// Target (height, width) after resizing
    pub target_size: (usize, usize),
    /// Augmentation policy; training sequences only
    pub augmenter: Option<Augmenter>,
    /// Batches per epoch; `None` means one pass over the split
    pub steps: Option<usize>,
    /// Reshuffle rows between epochs
    pub shuffle_on_epoch_end: bool,
    pub seed: u64,
    /// Threads decoding the images of one batch
    pub workers: usize,
}

impl SequenceConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        csv_path: P,
        class_names: &[String],
        source_image_dir: Q,
        batch_size: usize,
        target_size: (usize, usize),
    ) -> Self {
        Self {
            csv_path: csv_path.as_ref().to_path_buf(),
            class_names: class_names.to_vec(),
            source_image_dir: source_image_dir.as_ref().to_path_buf(),
            batch_size,
            target_size,
            augmenter: None,
            steps: None,
            shuffle_on_epoch_end: false,
            seed: 1,
            workers: 1,
        }
    }

    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle_on_epoch_end = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// A decoded batch in host memory
#[derive(Debug, Clone)]
pub struct ImageBatch {
    /// `[batch, 3, height, width]`, ImageNet-normalised
    pub images: Vec<f32>,
    /// `[batch, classes]`, 0.0 or 1.0
    pub labels: Vec<f32>,
    pub batch_size: usize,
    pub height: usize,
    pub width: usize,
    pub num_classes: usize,
}

impl ImageBatch {
    /// Upload the batch to a device
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                self.images.clone(),
                [self.batch_size, 3, self.height, self.width],
            ),
            device,
        );
        let labels = Tensor::<B, 2>::from_data(
            TensorData::new(self.labels.clone(), [self.batch_size, self.num_classes]),
            device,
        );
        (images, labels)
    }
}

/// Lazy multi-label image batches for one split
#[derive(Debug, Clone)]
pub struct AugmentedImageSequence {
    config: SequenceConfig,
    entries: Vec<LabeledImage>,
    order: Vec<usize>,
    steps: usize,
    epoch: u64,
    pool: Arc<ThreadPool>,
}

impl AugmentedImageSequence {
    pub fn new(config: SequenceConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(ChexNetError::invalid("batch_size", "0", "a positive integer"));
        }

        let entries = DatasetLoader::new(&config.class_names).load(&config.csv_path)?;
        let steps = config
            .steps
            .unwrap_or_else(|| entries.len().div_ceil(config.batch_size));

        if steps > 0 && entries.is_empty() {
            return Err(ChexNetError::dataset(
                &config.csv_path,
                format!("no samples to draw {steps} batches from"),
            ));
        }

        let workers = config.workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| {
                ChexNetError::invalid(
                    "generator_workers",
                    format!("{workers} ({e})"),
                    "a thread count the system can start",
                )
            })?;

        let mut sequence = Self {
            pool: Arc::new(pool),
            order: (0..entries.len()).collect(),
            entries,
            steps,
            epoch: 0,
            config,
        };
        if sequence.config.shuffle_on_epoch_end {
            sequence.shuffle();
        }

        info!(
            "Sequence over {:?}: {} samples, {} batches of {}",
            sequence.config.csv_path,
            sequence.entries.len(),
            sequence.steps,
            sequence.config.batch_size
        );
        Ok(sequence)
    }

    /// Batches per epoch
    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn num_classes(&self) -> usize {
        self.config.class_names.len()
    }

    /// Number of rows in the underlying split
    pub fn num_samples(&self) -> usize {
        self.entries.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Decode batch `idx` of the current epoch
    pub fn batch(&self, idx: usize) -> Result<ImageBatch> {
        if idx >= self.steps {
            return Err(ChexNetError::dataset(
                &self.config.csv_path,
                format!("batch index {idx} out of range for {} steps", self.steps),
            ));
        }

        let batch_size = self.config.batch_size;
        let positions: Vec<usize> = (idx * batch_size..(idx + 1) * batch_size).collect();
        let samples = self.decode_all(&positions)?;

        let (height, width) = self.config.target_size;
        let num_classes = self.num_classes();
        let mut images = Vec::with_capacity(batch_size * 3 * height * width);
        let mut labels = Vec::with_capacity(batch_size * num_classes);

        for (&position, pixels) in positions.iter().zip(samples) {
            images.extend(pixels);
            let entry = self.entry_at(position);
            labels.extend(entry.labels.iter().map(|&l| l as f32));
        }

        Ok(ImageBatch {
            images,
            labels,
            batch_size,
            height,
            width,
            num_classes,
        })
    }

    /// Every batch of the current epoch, in order
    pub fn iter(&self) -> impl Iterator<Item = Result<ImageBatch>> + '_ {
        (0..self.steps).map(move |idx| self.batch(idx))
    }

    /// Advance to the next epoch, reshuffling when enabled
    pub fn on_epoch_end(&mut self) {
        self.epoch += 1;
        if self.config.shuffle_on_epoch_end {
            self.shuffle();
        }
    }

    /// Image ids of the current epoch in batch order
    pub fn epoch_image_ids(&self) -> Vec<&str> {
        (0..self.steps * self.config.batch_size)
            .map(|position| self.entry_at(position).image_id.as_str())
            .collect()
    }

    fn shuffle(&mut self) {
        let mut rng = seeded_rng(self.config.seed.wrapping_add(self.epoch));
        self.order.shuffle(&mut rng);
        debug!("Reshuffled {:?} for epoch {}", self.config.csv_path, self.epoch);
    }

    fn entry_at(&self, position: usize) -> &LabeledImage {
        &self.entries[self.order[position % self.order.len()]]
    }

    fn decode_all(&self, positions: &[usize]) -> Result<Vec<Vec<f32>>> {
        self.pool
            .install(|| positions.par_iter().map(|&p| self.decode(p)).collect())
    }

    fn decode(&self, position: usize) -> Result<Vec<f32>> {
        let entry = self.entry_at(position);
        let path = self.config.source_image_dir.join(&entry.image_id);
        let (height, width) = self.config.target_size;

        let img = image::open(&path).map_err(|source| ChexNetError::ImageLoad {
            path: path.clone(),
            source,
        })?;
        let mut img = img.resize_exact(width as u32, height as u32, FilterType::Triangle);

        if let Some(augmenter) = &self.config.augmenter {
            // per-sample stream so results do not depend on the worker split
            let seed = self
                .config
                .seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(self.epoch << 32)
                .wrapping_add(position as u64);
            img = augmenter.apply(img, &mut seeded_rng(seed));
        }

        let rgb = img.to_rgb8();
        let mut pixels = Vec::with_capacity(3 * height * width);
        for c in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
                    pixels.push((value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]);
                }
            }
        }
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Luma, GrayImage};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn classes() -> Vec<String> {
        vec!["Atelectasis".to_string(), "Cardiomegaly".to_string()]
    }

    /// Five grayscale PNGs and a CSV describing them
    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("images");
        std::fs::create_dir_all(&images).unwrap();

        let mut csv = String::from("Image Index,Atelectasis,Cardiomegaly\n");
        for i in 0..5u8 {
            let name = format!("img_{i}.png");
            GrayImage::from_pixel(12, 10, Luma([i * 40])).save(images.join(&name)).unwrap();
            csv.push_str(&format!("{name},{},{}\n", i % 2, (i + 1) % 2));
        }
        std::fs::write(temp.path().join("train.csv"), csv).unwrap();
        temp
    }

    fn config(temp: &TempDir) -> SequenceConfig {
        SequenceConfig::new(
            temp.path().join("train.csv"),
            &classes(),
            temp.path().join("images"),
            2,
            (8, 6),
        )
    }

    #[test]
    fn test_default_steps_cover_split() {
        let temp = fixture();
        let sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.num_samples(), 5);
    }

    #[test]
    fn test_exactly_n_batches_per_epoch_and_restartable() {
        let temp = fixture();
        let mut sequence = AugmentedImageSequence::new(
            config(&temp).with_steps(4).with_shuffle(true).with_seed(3),
        )
        .unwrap();

        let first: Vec<_> = sequence.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(first.len(), 4);
        for batch in &first {
            assert_eq!(batch.batch_size, 2);
            assert_eq!(batch.images.len(), 2 * 3 * 8 * 6);
            assert_eq!(batch.labels.len(), 2 * 2);
        }

        sequence.on_epoch_end();
        assert_eq!(sequence.epoch(), 1);
        let second: Vec<_> = sequence.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn test_unshuffled_epochs_repeat_order() {
        let temp = fixture();
        let mut sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        let before: Vec<String> = sequence.epoch_image_ids().iter().map(|s| s.to_string()).collect();
        sequence.on_epoch_end();
        let after: Vec<String> = sequence.epoch_image_ids().iter().map(|s| s.to_string()).collect();
        assert_eq!(before, after);
        // 3 batches of 2 wrap around 5 rows
        assert_eq!(before.len(), 6);
        assert_eq!(before[5], before[0]);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let temp = fixture();
        let sequence =
            AugmentedImageSequence::new(config(&temp).with_steps(2).with_shuffle(true).with_seed(9))
                .unwrap();
        let mut ids: Vec<&str> = (0..5).map(|p| sequence.entry_at(p).image_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["img_0.png", "img_1.png", "img_2.png", "img_3.png", "img_4.png"]);
    }

    #[test]
    fn test_pixels_are_imagenet_normalised() {
        let temp = fixture();
        let sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        let batch = sequence.batch(0).unwrap();

        // img_0 is black: every channel equals -mean/std
        let plane = 8 * 6;
        for c in 0..3 {
            let expected = -IMAGENET_MEAN[c] / IMAGENET_STD[c];
            assert!((batch.images[c * plane] - expected).abs() < 1e-5);
        }
        assert_eq!(&batch.labels[..2], &[0.0, 1.0]);
    }

    #[test]
    fn test_parallel_decode_matches_serial() {
        let temp = fixture();
        let serial = AugmentedImageSequence::new(config(&temp).with_augmenter(Augmenter::default()))
            .unwrap()
            .batch(1)
            .unwrap();
        let parallel = AugmentedImageSequence::new(
            config(&temp)
                .with_augmenter(Augmenter::default())
                .with_workers(2),
        )
        .unwrap()
        .batch(1)
        .unwrap();
        assert_eq!(serial.images, parallel.images);
        assert_eq!(serial.labels, parallel.labels);
    }

    #[test]
    fn test_missing_image_fails_with_path() {
        let temp = fixture();
        std::fs::remove_file(temp.path().join("images").join("img_0.png")).unwrap();
        let sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        match sequence.batch(0) {
            Err(ChexNetError::ImageLoad { path, .. }) => assert!(path.ends_with("img_0.png")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parallel_decode_reports_missing_image() {
        let temp = fixture();
        std::fs::remove_file(temp.path().join("images").join("img_1.png")).unwrap();
        let sequence = AugmentedImageSequence::new(config(&temp).with_workers(4)).unwrap();
        match sequence.batch(0) {
            Err(ChexNetError::ImageLoad { path, .. }) => assert!(path.ends_with("img_1.png")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_workers_decodes_on_one_thread() {
        let temp = fixture();
        let sequence = AugmentedImageSequence::new(config(&temp).with_workers(0)).unwrap();
        assert_eq!(sequence.batch(0).unwrap().batch_size, sequence.batch_size());
    }

    #[test]
    fn test_corrupt_image_fails() {
        let temp = fixture();
        std::fs::write(temp.path().join("images").join("img_1.png"), b"not a png").unwrap();
        let sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        assert!(matches!(sequence.batch(0), Err(ChexNetError::ImageLoad { .. })));
    }

    #[test]
    fn test_empty_split_with_steps_is_error() {
        let temp = fixture();
        std::fs::write(temp.path().join("train.csv"), "Image Index,Atelectasis,Cardiomegaly\n").unwrap();
        assert!(AugmentedImageSequence::new(config(&temp).with_steps(1)).is_err());

        let empty = AugmentedImageSequence::new(config(&temp)).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.iter().count(), 0);
    }

    #[test]
    fn test_out_of_range_batch() {
        let temp = fixture();
        let sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        assert!(sequence.batch(3).is_err());
    }

    #[test]
    fn test_batch_to_tensors() {
        let temp = fixture();
        let sequence = AugmentedImageSequence::new(config(&temp)).unwrap();
        let device = <TestBackend as Backend>::Device::default();
        let (images, labels) = sequence.batch(0).unwrap().to_tensors::<TestBackend>(&device);
        assert_eq!(images.dims(), [2, 3, 8, 6]);
        assert_eq!(labels.dims(), [2, 2]);
    }
}
