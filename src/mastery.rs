use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::interval::Bin;

const RECENCY_DECAY: f64 = 0.05;
const CONFIDENCE_FLOOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryResult {
    pub current: f64,
    pub peak: f64,
}

/// Window scores from `now_bin` back to the oldest recorded window, most recent
/// first. Windows without activity read as 0; windows after `now_bin` are ignored.
pub fn bin_history(now_bin: i64, bins: &BTreeMap<i64, Bin>) -> Vec<f64> {
    let Some((&oldest, _)) = bins.first_key_value() else {
        return Vec::new();
    };
    let oldest = oldest.min(now_bin);
    (oldest..=now_bin)
        .rev()
        .map(|index| bins.get(&index).map_or(0.0, |bin| bin.score))
        .collect()
}

/// Recency-weighted mean of window scores, `scores[i]` being `i` windows ago.
///
/// Weights are `e^(-0.05 i) * (score / best)^3`, with the weight total floored at 1.2.
pub fn current_score(scores: &[f64]) -> f64 {
    let best = scores.iter().copied().fold(0.0, f64::max);
    if best <= 0.0 {
        return 0.0;
    }

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &score) in scores.iter().enumerate() {
        let weight = f64::exp(-RECENCY_DECAY * i as f64) * (score / best).powi(3);
        numerator += score * weight;
        denominator += weight;
    }
    numerator / f64::max(denominator, CONFIDENCE_FLOOR)
}

/// Best current score obtainable by anchoring at any window in the history.
pub fn peak_score(scores: &[f64]) -> f64 {
    (0..scores.len())
        .map(|start| current_score(&scores[start..]))
        .fold(0.0, f64::max)
}

/// Full recompute of current and peak from the window history.
pub fn mastery_score(scores: &[f64]) -> MasteryResult {
    MasteryResult {
        current: current_score(scores),
        peak: peak_score(scores),
    }
}

/// Cheap update after a single new solve: only the current score is recomputed
/// and the stored peak is bumped when exceeded.
pub fn refresh(stored: MasteryResult, scores: &[f64]) -> MasteryResult {
    let current = current_score(scores);
    MasteryResult {
        current,
        peak: stored.peak.max(current),
    }
}
