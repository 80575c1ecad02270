use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::catalog::{CandidateQuery, Catalog, Problem};
use crate::mastery::MasteryResult;

/// Rating assumed for a topic the user has never scored in.
pub const BASELINE_RATING: i32 = 800;
pub const CANDIDATE_POOL: usize = 200;
const RATING_WINDOW: i32 = 200;

/// Allowed overshoot of a candidate's rating over the user's rating in its
/// secondary topics, tried tightest first.
pub const MARGINS: [i32; 7] = [50, 100, 150, 200, 300, 500, 1000];

pub const DAILY_INCREMENT: i32 = 100;
pub const DAILY_TOPICS: usize = 3;
pub const FALLBACK_TOPIC: &str = "implementation";

/// A user's mastery per topic at one moment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterySnapshot {
    topics: BTreeMap<String, MasteryResult>,
}

impl MasterySnapshot {
    pub fn new() -> Self {
        MasterySnapshot::default()
    }

    pub fn insert(&mut self, topic: &str, result: MasteryResult) {
        self.topics.insert(topic.to_string(), result);
    }

    pub fn get(&self, topic: &str) -> MasteryResult {
        self.topics.get(topic).copied().unwrap_or_default()
    }

    /// Rounded current score, never below the baseline.
    pub fn rating(&self, topic: &str) -> i32 {
        let current = self.get(topic).current.round() as i32;
        current.max(BASELINE_RATING)
    }

    /// Topics with a nonzero current score.
    pub fn active(&self) -> impl Iterator<Item = (&str, MasteryResult)> {
        self.topics
            .iter()
            .filter(|(_, r)| r.current > 0.0)
            .map(|(t, r)| (t.as_str(), *r))
    }
}

impl FromIterator<(String, MasteryResult)> for MasterySnapshot {
    fn from_iter<I: IntoIterator<Item = (String, MasteryResult)>>(iter: I) -> Self {
        MasterySnapshot {
            topics: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyStrategy {
    /// Largest drop from peak first, weakest first on ties.
    Regressed,
    /// Smallest drop from peak first, strongest first on ties.
    Momentum,
    Explore,
}

impl DailyStrategy {
    /// Maps a roll in `0..100` onto a 50/30/20 split.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..50 => DailyStrategy::Regressed,
            50..80 => DailyStrategy::Momentum,
            _ => DailyStrategy::Explore,
        }
    }
}

pub struct Recommender<'a> {
    catalog: &'a Catalog,
    snapshot: &'a MasterySnapshot,
    solved: &'a HashSet<String>,
}

impl<'a> Recommender<'a> {
    pub fn new(
        catalog: &'a Catalog,
        snapshot: &'a MasterySnapshot,
        solved: &'a HashSet<String>,
    ) -> Self {
        Recommender {
            catalog,
            snapshot,
            solved,
        }
    }

    pub fn target_rating(&self, topic: &str, increment: i32) -> i32 {
        self.snapshot
            .rating(topic)
            .saturating_add(increment)
            .max(BASELINE_RATING)
    }

    /// Up to `k` unsolved problems on `topic` near `mastery + increment`,
    /// preferring ones that stay close to the user's level in their other topics.
    pub fn recommend(&self, topic: &str, increment: i32, k: usize) -> Vec<Problem> {
        let target = self.target_rating(topic, increment);
        let candidates = self.catalog.candidates(
            &CandidateQuery {
                topic,
                min_rating: target.saturating_sub(RATING_WINDOW),
                max_rating: target.saturating_add(RATING_WINDOW),
                target,
                limit: CANDIDATE_POOL,
            },
            self.solved,
        );

        let mut picked: Vec<&Problem> = Vec::with_capacity(k.min(candidates.len()));
        let mut added: HashSet<&str> = HashSet::new();
        for margin in MARGINS {
            if picked.len() >= k {
                break;
            }
            for &problem in &candidates {
                if picked.len() >= k {
                    break;
                }
                if added.contains(problem.id.as_str()) {
                    continue;
                }
                let balanced = problem
                    .topics
                    .iter()
                    .filter(|t| t.as_str() != topic)
                    .all(|t| problem.rating <= self.snapshot.rating(t).saturating_add(margin));
                if balanced {
                    added.insert(problem.id.as_str());
                    picked.push(problem);
                }
            }
        }

        tracing::debug!(
            topic,
            target_rating = target,
            candidates = candidates.len(),
            picked = picked.len(),
            "recommendation"
        );
        picked.into_iter().cloned().collect()
    }

    /// One problem for today, drawn from a few topics chosen by a random strategy.
    pub fn daily<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Problem> {
        let mut active: Vec<(&str, MasteryResult)> = self.snapshot.active().collect();
        if !active.is_empty() {
            let strategy = DailyStrategy::from_roll(rng.random_range(0..100));
            order_topics(&mut active, strategy, rng);
            active.truncate(DAILY_TOPICS);
            active.shuffle(rng);
            tracing::debug!(?strategy, topics = ?active.iter().map(|(t, _)| *t).collect::<Vec<_>>(), "daily pick");

            for (topic, _) in &active {
                if let Some(problem) = self.recommend(topic, DAILY_INCREMENT, 1).into_iter().next() {
                    return Some(problem);
                }
            }
        }
        self.recommend(FALLBACK_TOPIC, DAILY_INCREMENT, 1)
            .into_iter()
            .next()
    }
}

pub fn order_topics<R: Rng + ?Sized>(
    topics: &mut [(&str, MasteryResult)],
    strategy: DailyStrategy,
    rng: &mut R,
) {
    // Whole rating points, truncated, so near-equal decays tie.
    let decay = |r: &MasteryResult| (r.peak - r.current) as i64;
    let current = |r: &MasteryResult| r.current as i64;
    match strategy {
        DailyStrategy::Regressed => topics.sort_by(|(_, a), (_, b)| {
            decay(b)
                .cmp(&decay(a))
                .then(current(a).cmp(&current(b)))
        }),
        DailyStrategy::Momentum => topics.sort_by(|(_, a), (_, b)| {
            decay(a)
                .cmp(&decay(b))
                .then(current(b).cmp(&current(a)))
        }),
        DailyStrategy::Explore => topics.shuffle(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn problem(id: &str, rating: i32, topics: &[&str]) -> Problem {
        Problem {
            id: id.into(),
            name: id.into(),
            rating,
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn standing(current: f64, peak: f64) -> MasteryResult {
        MasteryResult { current, peak }
    }

    #[test]
    fn rating_floors_at_baseline() {
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.4, 1300.0));
        snapshot.insert("math", standing(312.0, 400.0));
        assert_eq!(snapshot.rating("graphs"), 1200);
        assert_eq!(snapshot.rating("math"), 800);
        assert_eq!(snapshot.rating("unknown"), 800);
    }

    #[test]
    fn target_rating_never_below_baseline() {
        let catalog = Catalog::default();
        let snapshot = MasterySnapshot::new();
        let solved = HashSet::new();
        let rec = Recommender::new(&catalog, &snapshot, &solved);
        assert_eq!(rec.target_rating("graphs", 100), 900);
        assert_eq!(rec.target_rating("graphs", -500), 800);
    }

    #[test]
    fn pure_topic_candidate_accepted_at_tightest_margin() {
        let catalog = Catalog::new(vec![problem("1A", 1290, &["graphs"])]);
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.0, 1200.0));
        let solved = HashSet::new();
        let found = Recommender::new(&catalog, &snapshot, &solved).recommend("graphs", 100, 1);
        assert_eq!(found, vec![problem("1A", 1290, &["graphs"])]);
    }

    #[test]
    fn balanced_candidates_beat_closer_unbalanced_ones() {
        let catalog = Catalog::new(vec![
            // Closest to 1300 but far beyond the user's strings level.
            problem("1A", 1290, &["graphs", "strings"]),
            problem("2A", 1150, &["graphs"]),
        ]);
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.0, 1200.0));
        snapshot.insert("strings", standing(800.0, 800.0));
        let solved = HashSet::new();
        let rec = Recommender::new(&catalog, &snapshot, &solved);

        let found = rec.recommend("graphs", 100, 2);
        let ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        // 2A passes at margin 50; 1A needs 490 over strings and first fits at 500.
        assert_eq!(ids, vec!["2A", "1A"]);
    }

    #[test]
    fn unbalanced_candidate_needs_margin_500() {
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("strings", standing(800.0, 800.0));
        let candidate = problem("1A", 1290, &["graphs", "strings"]);
        let first_fit = MARGINS
            .iter()
            .find(|&&m| candidate.rating <= snapshot.rating("strings") + m);
        assert_eq!(first_fit, Some(&500));
    }

    #[test]
    fn returns_fewer_than_k_when_pool_is_thin() {
        let catalog = Catalog::new(vec![
            problem("1A", 1300, &["graphs"]),
            problem("2A", 2900, &["graphs"]),
            problem("3A", 1300, &["graphs", "advanced math"]),
        ]);
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.0, 1200.0));
        let solved: HashSet<String> = ["1A".to_string()].into();
        let rec = Recommender::new(&catalog, &snapshot, &solved);
        let found = rec.recommend("graphs", 100, 5);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "3A");
        assert!(rec.recommend("graphs", 100, 0).is_empty());
        assert!(rec.recommend("geometry", 100, 5).is_empty());
    }

    #[test]
    fn strategy_split() {
        assert_eq!(DailyStrategy::from_roll(0), DailyStrategy::Regressed);
        assert_eq!(DailyStrategy::from_roll(49), DailyStrategy::Regressed);
        assert_eq!(DailyStrategy::from_roll(50), DailyStrategy::Momentum);
        assert_eq!(DailyStrategy::from_roll(79), DailyStrategy::Momentum);
        assert_eq!(DailyStrategy::from_roll(80), DailyStrategy::Explore);
        assert_eq!(DailyStrategy::from_roll(99), DailyStrategy::Explore);
    }

    #[test]
    fn regressed_orders_by_decay_then_weakness() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut topics = vec![
            ("a", standing(1500.0, 1600.0)),
            ("b", standing(1000.0, 1400.0)),
            ("c", standing(900.0, 1300.0)),
            ("d", standing(1800.0, 1800.0)),
        ];
        order_topics(&mut topics, DailyStrategy::Regressed, &mut rng);
        let order: Vec<&str> = topics.iter().map(|(t, _)| *t).collect();
        assert_eq!(order, vec!["c", "b", "a", "d"]);

        order_topics(&mut topics, DailyStrategy::Momentum, &mut rng);
        let order: Vec<&str> = topics.iter().map(|(t, _)| *t).collect();
        assert_eq!(order, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn daily_falls_back_to_implementation() {
        let catalog = Catalog::new(vec![
            problem("1A", 900, &["implementation"]),
            problem("2A", 900, &["graphs"]),
        ]);
        let snapshot = MasterySnapshot::new();
        let solved = HashSet::new();
        let mut rng = StdRng::seed_from_u64(1);
        let pick = Recommender::new(&catalog, &snapshot, &solved).daily(&mut rng);
        assert_eq!(pick.map(|p| p.id), Some("1A".to_string()));
    }

    #[test]
    fn daily_picks_from_active_topics_deterministically() {
        let catalog = Catalog::new(vec![
            problem("1A", 1300, &["graphs"]),
            problem("2A", 1100, &["math"]),
            problem("3A", 900, &["implementation"]),
        ]);
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.0, 1500.0));
        snapshot.insert("math", standing(1000.0, 1000.0));
        let solved = HashSet::new();
        let rec = Recommender::new(&catalog, &snapshot, &solved);

        for seed in 0..20 {
            let first = rec.daily(&mut StdRng::seed_from_u64(seed));
            let second = rec.daily(&mut StdRng::seed_from_u64(seed));
            assert_eq!(first, second);
            let id = first.map(|p| p.id).unwrap();
            assert!(id == "1A" || id == "2A", "seed {seed} picked {id}");
        }
    }

    #[test]
    fn huge_increments_saturate_instead_of_overflowing() {
        let catalog = Catalog::new(vec![
            problem("1A", 1300, &["graphs", "math"]),
            problem("2A", 1000, &["graphs"]),
        ]);
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.0, 1200.0));
        let solved = HashSet::new();
        let rec = Recommender::new(&catalog, &snapshot, &solved);

        assert_eq!(rec.target_rating("graphs", i32::MAX), i32::MAX);
        assert!(rec.recommend("graphs", i32::MAX, 1).is_empty());
        assert_eq!(rec.target_rating("graphs", i32::MIN), BASELINE_RATING);
        let low = rec.recommend("graphs", i32::MIN, 1);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, "2A");
    }

    #[test]
    fn daily_falls_back_when_active_topics_have_nothing() {
        let catalog = Catalog::new(vec![problem("3A", 900, &["implementation"])]);
        let mut snapshot = MasterySnapshot::new();
        snapshot.insert("graphs", standing(1200.0, 1500.0));
        snapshot.insert("math", standing(1000.0, 1000.0));
        let solved = HashSet::new();
        let rec = Recommender::new(&catalog, &snapshot, &solved);

        for seed in 0..10 {
            let pick = rec.daily(&mut StdRng::seed_from_u64(seed));
            assert_eq!(pick.map(|p| p.id), Some("3A".to_string()), "seed {seed}");
        }
    }

    #[test]
    fn fractional_decay_differences_tie() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut topics = vec![
            ("strong", standing(1500.2, 1600.6)),
            ("weak", standing(900.7, 1001.0)),
            ("steady", standing(1300.0, 1300.4)),
        ];
        order_topics(&mut topics, DailyStrategy::Regressed, &mut rng);
        let order: Vec<&str> = topics.iter().map(|(t, _)| *t).collect();
        // Both drops truncate to 100, so the weaker topic comes first.
        assert_eq!(order, vec!["weak", "strong", "steady"]);

        order_topics(&mut topics, DailyStrategy::Momentum, &mut rng);
        let order: Vec<&str> = topics.iter().map(|(t, _)| *t).collect();
        assert_eq!(order, vec!["steady", "strong", "weak"]);
    }

    #[test]
    fn daily_with_nothing_available_is_none() {
        let catalog = Catalog::default();
        let snapshot = MasterySnapshot::new();
        let solved = HashSet::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(Recommender::new(&catalog, &snapshot, &solved).daily(&mut rng).is_none());
    }
}
