use crate::data::{DatasetLoader, LabeledImage};
use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Sample totals for one dataset split
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCounts {
    /// Number of rows in the split
    pub total: usize,
    /// Positive occurrences per class, in class order
    pub positive: Vec<(String, usize)>,
}

impl SampleCounts {
    /// Count positives per class over already-loaded records
    pub fn from_records(class_names: &[String], records: &[LabeledImage]) -> Self {
        let positive = class_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let count = records.iter().filter(|r| r.is_positive(i)).count();
                (name.clone(), count)
            })
            .collect();

        Self {
            total: records.len(),
            positive,
        }
    }

    /// Positive count for a class, if it is known
    pub fn positive_for(&self, class: &str) -> Option<usize> {
        self.positive
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, count)| *count)
    }
}

/// Read `<output_dir>/<split>.csv` and count samples per class
pub fn get_sample_counts<P: AsRef<Path>>(
    output_dir: P,
    split: &str,
    class_names: &[String],
) -> Result<SampleCounts> {
    let path = output_dir.as_ref().join(format!("{split}.csv"));
    let records = DatasetLoader::new(class_names).load(&path)?;
    let counts = SampleCounts::from_records(class_names, &records);
    debug!("{} counts: {:?}", split, counts);
    Ok(counts)
}
