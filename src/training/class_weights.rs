use crate::data::SampleCounts;
use crate::error::{ChexNetError, Result};
use crate::model::loss::WeightedBinaryCrossEntropy;
use std::fmt;

/// Loss weights for one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeight {
    pub class: String,
    pub negative: f64,
    pub positive: f64,
}

/// Per-class weights in class order
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights(Vec<ClassWeight>);

impl ClassWeights {
    pub fn iter(&self) -> impl Iterator<Item = &ClassWeight> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, class: &str) -> Option<&ClassWeight> {
        self.0.iter().find(|w| w.class == class)
    }

    /// Weighted loss for the training step
    pub fn to_loss(&self) -> WeightedBinaryCrossEntropy {
        WeightedBinaryCrossEntropy::new(
            self.0
                .iter()
                .map(|w| (w.positive as f32, w.negative as f32))
                .collect(),
        )
    }
}

impl fmt::Display for ClassWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for w in &self.0 {
            writeln!(
                f,
                "  {:<20} positive {:>8.4}  negative {:>8.4}",
                w.class, w.positive, w.negative
            )?;
        }
        Ok(())
    }
}

/// Inverse-frequency class weights
///
/// `positive = multiply * total / positives` and
/// `negative = total / (total - positives)`; a class without positives or
/// without negatives is rejected.
pub fn get_class_weights(counts: &SampleCounts, multiply: f64) -> Result<ClassWeights> {
    if !(multiply.is_finite() && multiply > 0.0) {
        return Err(ChexNetError::invalid(
            "positive_weights_multiply",
            multiply.to_string(),
            "a positive number",
        ));
    }

    let total = counts.total;
    counts
        .positive
        .iter()
        .map(|(class, positive)| {
            let positive = *positive;
            if positive == 0 || positive >= total {
                return Err(ChexNetError::DegenerateClass {
                    class: class.clone(),
                    positive,
                    total,
                });
            }
            let negative_count = (total - positive) as f64;
            Ok(ClassWeight {
                class: class.clone(),
                positive: multiply * total as f64 / positive as f64,
                negative: total as f64 / negative_count,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(ClassWeights)
}
