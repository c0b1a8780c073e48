//! Ranking metrics for multi-label evaluation.

/// Area under the ROC curve for one class
///
/// Uses the Mann-Whitney rank statistic with tied scores sharing their
/// average rank. Returns NaN when `labels` holds a single class.
pub fn auroc(scores: &[f32], labels: &[f32]) -> f64 {
    debug_assert_eq!(scores.len(), labels.len());

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average;
        }
        i = j + 1;
    }

    let positives = labels.iter().filter(|&&y| y >= 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }

    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&y, _)| y >= 0.5)
        .map(|(_, &r)| r)
        .sum();

    let n_pos = positives as f64;
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * negatives as f64)
}

/// Per-class AUROC over row-major `[samples, classes]` buffers
pub fn per_class_auroc(scores: &[f32], labels: &[f32], num_classes: usize) -> Vec<f64> {
    if num_classes == 0 {
        return Vec::new();
    }
    (0..num_classes)
        .map(|c| {
            let s: Vec<f32> = scores.iter().skip(c).step_by(num_classes).copied().collect();
            let y: Vec<f32> = labels.iter().skip(c).step_by(num_classes).copied().collect();
            auroc(&s, &y)
        })
        .collect()
}

/// Mean over the defined (non-NaN) values; NaN when none are defined
pub fn nan_mean(values: &[f64]) -> f64 {
    let defined: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if defined.is_empty() {
        f64::NAN
    } else {
        defined.iter().sum::<f64>() / defined.len() as f64
    }
}
