use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::AncestryIndex;

const ATTEMPT_DECAY: f64 = 0.1;
const ATTEMPT_FLOOR: f64 = 0.5;

const EXPECTED_MINUTES: f64 = 45.0;
const MINUTES_SMOOTHING: f64 = 10.0;
const SPEED_FLOOR: f64 = 0.85;

const PROXIMITY_DECAY: f64 = 0.75;

/// A problem's first accepted solve, ready to be credited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub problem_id: String,
    pub rating: i32,
    /// Judged attempts up to and including the first accepted one.
    pub attempts: u32,
    pub topics: Vec<String>,
    pub time_spent_minutes: Option<u32>,
    pub solved_at: DateTime<Utc>,
}

impl Submission {
    /// Credit before graph decay. Time spent only counts when it was reported.
    pub fn base_credit(&self) -> f64 {
        match self.time_spent_minutes {
            Some(minutes) if minutes > 0 => {
                base_credit_with_time(self.rating, self.attempts, minutes)
            }
            _ => base_credit(self.rating, self.attempts),
        }
    }
}

/// One observation for a (submission, topic) pair. The multiplier doubles as
/// the confidence weight during aggregation, so it is never folded away.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveAttributes {
    pub base_rating: f64,
    pub multiplier: f64,
}

impl SolveAttributes {
    pub fn credit(&self) -> f64 {
        self.base_rating * self.multiplier
    }
}

pub fn base_credit(rating: i32, attempts: u32) -> f64 {
    let rating = f64::from(rating);
    if attempts <= 1 {
        return rating;
    }
    let modifier =
        ATTEMPT_FLOOR + (1.0 - ATTEMPT_FLOOR) * f64::exp(-ATTEMPT_DECAY * f64::from(attempts - 1));
    rating * modifier
}

pub fn base_credit_with_time(rating: i32, attempts: u32, minutes_spent: u32) -> f64 {
    let speed_factor =
        (EXPECTED_MINUTES + MINUTES_SMOOTHING) / (f64::from(minutes_spent) + MINUTES_SMOOTHING);
    let speed_multiplier = SPEED_FLOOR + (1.0 - SPEED_FLOOR) * speed_factor;
    base_credit(rating, attempts) * speed_multiplier
}

/// `0.75^d` where `d` is the shortest distance from any of the submission's
/// topics up to `target`; 0 when `target` is not a prerequisite of any of them.
pub fn multiplier(target: &str, submission: &Submission, index: &AncestryIndex) -> f64 {
    submission
        .topics
        .iter()
        .filter_map(|topic| index.distance(topic, target))
        .min()
        .map_or(0.0, |d| PROXIMITY_DECAY.powi(d as i32))
}

/// Observations for every topic that receives credit from `submission`.
pub fn solve_credits(submission: &Submission, index: &AncestryIndex) -> Vec<(String, SolveAttributes)> {
    let base_rating = submission.base_credit();
    index
        .topics()
        .filter_map(|topic| {
            let m = multiplier(topic, submission, index);
            (m > 0.0).then(|| {
                (
                    topic.to_string(),
                    SolveAttributes {
                        base_rating,
                        multiplier: m,
                    },
                )
            })
        })
        .collect()
}
