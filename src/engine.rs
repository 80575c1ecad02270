use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::credit::{self, Submission};
use crate::error::{Error, Result};
use crate::graph::{AncestryIndex, TopicGraph};
use crate::history::{self, Attempt, ProblemId, ProblemOutcome};
use crate::interval::{self, BinBatch};
use crate::mastery::{self, MasteryResult};
use crate::store::{SolveStatus, UserRecord};
use crate::tags::TagMap;

/// Immutable scoring context: the topic graph, its ancestry index, the tag
/// vocabulary and the window width. Built once per graph version.
#[derive(Debug, Clone)]
pub struct Engine {
    graph: TopicGraph,
    ancestry: AncestryIndex,
    tags: TagMap,
    bin_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Problems newly credited as solved.
    pub solved: usize,
    pub unsolved: usize,
    /// Problems skipped because they were already solved before this sync.
    pub skipped: usize,
    pub bins_touched: usize,
}

impl Engine {
    pub fn new(graph: TopicGraph, tags: TagMap, bin_days: u32) -> Self {
        let ancestry = AncestryIndex::build(&graph);
        Engine {
            graph,
            ancestry,
            tags,
            bin_days: bin_days.max(1),
        }
    }

    /// Graph from `topics.csv`/`edges.csv`; tags from `tags.csv` when present,
    /// otherwise the built-in Codeforces table.
    pub fn load(config: &Config) -> Result<Self> {
        let graph = TopicGraph::load_csv(&config.topics_path(), &config.edges_path())?;
        let tags_path = config.tags_path();
        let tags = if tags_path.exists() {
            let mut tags = TagMap::load_csv(&tags_path)?;
            tags.add_compound(&["trees", "dynamic programming"], "tree dp");
            tags
        } else {
            TagMap::codeforces()
        };
        tracing::info!(
            topics = graph.topics.len(),
            edges = graph.edges.len(),
            bin_days = config.bin_days,
            "engine loaded"
        );
        Ok(Engine::new(graph, tags, config.bin_days))
    }

    pub fn graph(&self) -> &TopicGraph {
        &self.graph
    }

    pub fn ancestry(&self) -> &AncestryIndex {
        &self.ancestry
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn bin_index(&self, at: DateTime<Utc>) -> i64 {
        interval::bin_index(at, self.bin_days)
    }

    pub fn submission(
        &self,
        problem_id: &ProblemId,
        attempts: u32,
        rating: i32,
        raw_tags: &[String],
        solved_at: DateTime<Utc>,
    ) -> Submission {
        Submission {
            problem_id: problem_id.to_string(),
            rating,
            attempts,
            topics: self.tags.topics_for(raw_tags),
            time_spent_minutes: None,
            solved_at,
        }
    }

    /// Queues the submission's observations into the batch, one per credited topic.
    pub fn credit(&self, submission: &Submission, batch: &mut BinBatch) {
        let index = self.bin_index(submission.solved_at);
        for (topic, attributes) in credit::solve_credits(submission, &self.ancestry) {
            batch.add(&topic, index, attributes);
        }
    }

    /// Folds a full submission history into the record: new solves are credited
    /// into their windows, statuses are merged, and every topic is fully recomputed.
    pub fn apply_history(
        &self,
        record: &mut UserRecord,
        attempts: Vec<Attempt>,
        now: DateTime<Utc>,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let mut batch = BinBatch::new();

        for (problem_id, problem_attempts) in history::group_by_problem(attempts) {
            let id = problem_id.to_string();
            if record.is_solved(&id) {
                report.skipped += 1;
                continue;
            }
            match history::scan_problem(&problem_attempts) {
                Some(ProblemOutcome::Solved {
                    attempts,
                    solved_at,
                    rating,
                    tags,
                }) => {
                    record.mark_problem(&id, SolveStatus::Solved, solved_at);
                    let submission = self.submission(&problem_id, attempts, rating, &tags, solved_at);
                    self.credit(&submission, &mut batch);
                    report.solved += 1;
                }
                Some(ProblemOutcome::Unsolved { last_attempted_at }) => {
                    record.mark_problem(&id, SolveStatus::Unsolved, last_attempted_at);
                    report.unsolved += 1;
                }
                None => {}
            }
        }

        report.bins_touched = batch.merge_into(&mut record.bins);
        self.recompute_all(record, now);
        report
    }

    /// Credits one manually reported solve, found in the user's history.
    pub fn apply_manual_solve(
        &self,
        record: &mut UserRecord,
        problem_id: &ProblemId,
        attempts: &[Attempt],
        time_spent_minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let id = problem_id.to_string();
        if record.is_solved(&id) {
            return Err(Error::AlreadySolved(id));
        }

        let own: Vec<Attempt> = attempts
            .iter()
            .filter(|a| &a.problem_id == problem_id)
            .cloned()
            .collect();
        let Some(ProblemOutcome::Solved {
            attempts,
            solved_at,
            rating,
            tags,
        }) = history::scan_problem(&own)
        else {
            return Err(Error::NotSolved(id));
        };

        let mut submission = self.submission(problem_id, attempts, rating, &tags, solved_at);
        submission.time_spent_minutes = time_spent_minutes.filter(|&m| m > 0);

        record.mark_problem(&id, SolveStatus::Solved, solved_at);
        let index = self.bin_index(solved_at);
        for (topic, attributes) in credit::solve_credits(&submission, &self.ancestry) {
            record
                .bins
                .entry(topic)
                .or_default()
                .entry(index)
                .or_default()
                .record(attributes);
        }
        self.refresh_all(record, now);
        Ok(submission)
    }

    fn history_for(&self, record: &UserRecord, topic: &str, now: DateTime<Utc>) -> Vec<f64> {
        record
            .topic_bins(topic)
            .map(|bins| mastery::bin_history(self.bin_index(now), bins))
            .unwrap_or_default()
    }

    /// Current and peak for every topic, rescanning the whole window history.
    pub fn recompute_all(&self, record: &mut UserRecord, now: DateTime<Utc>) {
        for topic in self.ancestry.topics() {
            let scores = self.history_for(record, topic, now);
            record.set_mastery(topic, mastery::mastery_score(&scores), now);
        }
    }

    /// Current score for every topic; peaks are only raised, never rescanned.
    pub fn refresh_all(&self, record: &mut UserRecord, now: DateTime<Utc>) {
        for topic in self.ancestry.topics() {
            let scores = self.history_for(record, topic, now);
            let refreshed = mastery::refresh(record.mastery_of(topic), &scores);
            record.set_mastery(topic, refreshed, now);
        }
    }

    pub fn stats(&self, record: &UserRecord) -> Vec<(String, MasteryResult)> {
        self.ancestry
            .topics()
            .map(|topic| (topic.to_string(), record.mastery_of(topic)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Topic, TopicEdge};
    use crate::history::Verdict;
    use chrono::Duration;

    fn engine() -> Engine {
        let graph = TopicGraph::new(
            ["implementation", "greedy", "dynamic programming", "strings"]
                .iter()
                .map(|t| Topic::new(t))
                .collect(),
            vec![
                TopicEdge::new("implementation", "greedy"),
                TopicEdge::new("greedy", "dynamic programming"),
                TopicEdge::new("implementation", "strings"),
            ],
        );
        Engine::new(graph, TagMap::codeforces(), 14)
    }

    fn attempt(id: &str, verdict: &str, rating: i32, tags: &[&str], at: DateTime<Utc>) -> Attempt {
        Attempt {
            problem_id: id.parse().unwrap(),
            verdict: Verdict::parse(verdict),
            rating: Some(rating),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            submitted_at: at,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn sync_credits_topic_and_prerequisites() {
        let engine = engine();
        let mut record = UserRecord::default();
        let solved_at = now() - Duration::days(1);
        let report = engine.apply_history(
            &mut record,
            vec![attempt("1520D", "OK", 1600, &["dp"], solved_at)],
            now(),
        );
        assert_eq!(report.solved, 1);
        assert_eq!(report.bins_touched, 3);

        let index = engine.bin_index(solved_at);
        let dp = &record.bins["dynamic programming"][&index];
        assert_eq!(dp.credits, vec![1600.0]);
        assert_eq!(dp.multipliers, vec![1.0]);
        let implementation = &record.bins["implementation"][&index];
        assert_eq!(implementation.credits, vec![900.0]);
        assert_eq!(implementation.multipliers, vec![0.5625]);
        assert!(!record.bins.contains_key("strings"));

        assert!(record.mastery_of("dynamic programming").current > 0.0);
        assert_eq!(record.mastery_of("strings"), MasteryResult::default());
    }

    #[test]
    fn sync_skips_already_solved_and_merges_unsolved() {
        let engine = engine();
        let mut record = UserRecord::default();
        let t = now() - Duration::days(3);
        engine.apply_history(&mut record, vec![attempt("1A", "OK", 1200, &["greedy"], t)], now());
        let bins_before = record.bins.clone();

        let report = engine.apply_history(
            &mut record,
            vec![
                attempt("1A", "OK", 1200, &["greedy"], t),
                attempt("2B", "WRONG_ANSWER", 1500, &["strings"], t),
            ],
            now(),
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(report.unsolved, 1);
        assert_eq!(record.bins, bins_before);
        assert!(!record.is_solved("2B"));
    }

    #[test]
    fn late_sync_backfills_old_windows() {
        let engine = engine();
        let mut record = UserRecord::default();
        let old = now() - Duration::days(100);
        engine.apply_history(&mut record, vec![attempt("1A", "OK", 1200, &["greedy"], old)], now());
        let windows: Vec<i64> = record.bins["greedy"].keys().copied().collect();
        assert_eq!(windows, vec![engine.bin_index(old)]);
        assert!(engine.bin_index(old) < engine.bin_index(now()));
    }

    #[test]
    fn recompute_is_idempotent() {
        let engine = engine();
        let mut record = UserRecord::default();
        engine.apply_history(
            &mut record,
            vec![
                attempt("1A", "OK", 1200, &["greedy"], now() - Duration::days(40)),
                attempt("2A", "OK", 1900, &["dp"], now() - Duration::days(2)),
            ],
            now(),
        );
        let first = engine.stats(&record);
        engine.recompute_all(&mut record, now());
        engine.recompute_all(&mut record, now());
        assert_eq!(engine.stats(&record), first);
    }

    #[test]
    fn manual_solve_uses_time_and_refreshes() {
        let engine = engine();
        let mut record = UserRecord::default();
        let history = vec![
            attempt("1A", "WRONG_ANSWER", 1000, &["implementation"], now() - Duration::hours(2)),
            attempt("1A", "OK", 1000, &["implementation"], now() - Duration::hours(1)),
        ];
        let id: ProblemId = "1A".parse().unwrap();
        let submission = engine
            .apply_manual_solve(&mut record, &id, &history, Some(20), now())
            .unwrap();
        assert_eq!(submission.attempts, 2);
        assert_eq!(submission.time_spent_minutes, Some(20));
        assert!(record.is_solved("1A"));

        let bin = &record.bins["implementation"][&engine.bin_index(now())];
        assert_eq!(bin.credits, vec![submission.base_credit()]);
        let m = record.mastery_of("implementation");
        assert!(m.current > 0.0);
        assert_eq!(m.peak, m.current);

        assert!(matches!(
            engine.apply_manual_solve(&mut record, &id, &history, None, now()),
            Err(Error::AlreadySolved(_))
        ));
    }

    #[test]
    fn manual_solve_requires_accepted_verdict() {
        let engine = engine();
        let mut record = UserRecord::default();
        let history = vec![attempt("1A", "WRONG_ANSWER", 1000, &["implementation"], now())];
        let id: ProblemId = "1A".parse().unwrap();
        assert!(matches!(
            engine.apply_manual_solve(&mut record, &id, &history, None, now()),
            Err(Error::NotSolved(_))
        ));
        let other: ProblemId = "2A".parse().unwrap();
        assert!(matches!(
            engine.apply_manual_solve(&mut record, &other, &history, None, now()),
            Err(Error::NotSolved(_))
        ));
        assert!(record.bins.is_empty());
        assert!(record.problems.is_empty());
    }
}
