use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credit::SolveAttributes;

pub const DEFAULT_BIN_DAYS: u32 = 14;
const SECONDS_PER_DAY: i64 = 86_400;

// Minimum confidence mass, so a single observation cannot carry a full-strength score.
const CONFIDENCE_FLOOR: f64 = 1.5;

/// Calendar-anchored window number for an instant.
pub fn bin_index(at: DateTime<Utc>, bin_days: u32) -> i64 {
    at.timestamp()
        .div_euclid(i64::from(bin_days.max(1)) * SECONDS_PER_DAY)
}

/// Confidence-weighted score of every `(credit, multiplier)` observation in a window.
///
/// Each observation is weighted by `(credit / best_credit)^3`; the denominator
/// sums multipliers rather than credits, floored at 1.5. The cubic weight makes
/// this non-associative, so it is always evaluated over the full list.
pub fn bin_score(credits: &[f64], multipliers: &[f64]) -> f64 {
    let best = credits.iter().copied().fold(0.0, f64::max);
    if best <= 0.0 {
        return 0.0;
    }

    let (numerator, denominator) = credits.iter().zip(multipliers).fold(
        (0.0, 0.0),
        |(num, den), (&credit, &multiplier)| {
            let weight = (credit / best).powi(3);
            (num + credit * weight, den + multiplier * weight)
        },
    );
    numerator / f64::max(denominator, CONFIDENCE_FLOOR)
}

pub fn aggregate(observations: &[SolveAttributes]) -> f64 {
    let credits: Vec<f64> = observations.iter().map(SolveAttributes::credit).collect();
    let multipliers: Vec<f64> = observations.iter().map(|o| o.multiplier).collect();
    bin_score(&credits, &multipliers)
}

/// Score of a stored window after one more observation lands in it.
pub fn aggregate_bin(
    existing_credits: &[f64],
    existing_multipliers: &[f64],
    new_credit: f64,
    new_multiplier: f64,
) -> f64 {
    let mut credits = existing_credits.to_vec();
    let mut multipliers = existing_multipliers.to_vec();
    credits.push(new_credit);
    multipliers.push(new_multiplier);
    bin_score(&credits, &multipliers)
}

/// One topic's observations inside one window. The lists are append-only and
/// index-aligned; `score` is always derived from all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub credits: Vec<f64>,
    pub multipliers: Vec<f64>,
    pub score: f64,
}

impl Bin {
    pub fn record(&mut self, observation: SolveAttributes) {
        self.extend([observation]);
    }

    /// Appends observations and rescores once. Zero-multiplier observations are not recorded.
    pub fn extend<I: IntoIterator<Item = SolveAttributes>>(&mut self, observations: I) {
        for observation in observations {
            if observation.multiplier <= 0.0 {
                continue;
            }
            self.credits.push(observation.credit());
            self.multipliers.push(observation.multiplier);
        }
        self.score = bin_score(&self.credits, &self.multipliers);
    }

    pub fn len(&self) -> usize {
        self.credits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }
}

/// New observations from one sync, grouped per `(topic, window)` so each stored
/// window is read, extended and rescored exactly once.
#[derive(Debug, Default)]
pub struct BinBatch {
    pending: BTreeMap<(String, i64), Vec<SolveAttributes>>,
}

impl BinBatch {
    pub fn new() -> Self {
        BinBatch::default()
    }

    pub fn add(&mut self, topic: &str, index: i64, observation: SolveAttributes) {
        if observation.multiplier <= 0.0 {
            return;
        }
        self.pending
            .entry((topic.to_string(), index))
            .or_default()
            .push(observation);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends pending observations after whatever each window already holds.
    pub fn merge_into(self, bins: &mut BTreeMap<String, BTreeMap<i64, Bin>>) -> usize {
        let touched = self.pending.len();
        for ((topic, index), observations) in self.pending {
            bins.entry(topic)
                .or_default()
                .entry(index)
                .or_default()
                .extend(observations);
        }
        touched
    }
}
