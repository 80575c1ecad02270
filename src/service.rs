use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::Instrument;
use uuid::Uuid;

use crate::catalog::{Catalog, Problem};
use crate::credit::Submission;
use crate::engine::{Engine, SyncReport};
use crate::error::{Error, Result};
use crate::graph::TopicGraph;
use crate::history::{HistoryProvider, ProblemId};
use crate::mastery::MasteryResult;
use crate::recommend::Recommender;
use crate::store::{SolveStatus, Store, UserRecord};

/// A solve the user reports by hand, optionally with the minutes it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSolve {
    pub problem_id: String,
    #[serde(default)]
    pub time_spent_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentProblem {
    pub problem_id: String,
    pub status: SolveStatus,
    pub last_attempted_at: DateTime<Utc>,
    /// Catalog details, absent for problems the catalog does not know.
    pub name: Option<String>,
    pub rating: Option<i32>,
    pub topics: Vec<String>,
}

type Clock = fn() -> DateTime<Utc>;

/// Per-user operations over the shared engine and catalog. Writes for one
/// handle are serialised; different handles proceed independently.
pub struct MasteryService<S, H> {
    engine: Arc<Engine>,
    catalog: Arc<Catalog>,
    store: S,
    history: H,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    clock: Clock,
}

impl<S: Store, H: HistoryProvider> MasteryService<S, H> {
    pub fn new(engine: Arc<Engine>, catalog: Arc<Catalog>, store: S, history: H) -> Self {
        MasteryService {
            engine,
            catalog,
            store,
            history,
            locks: Mutex::new(HashMap::new()),
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock, for reproducible window boundaries.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn graph(&self) -> &TopicGraph {
        self.engine.graph()
    }

    async fn lock_user(&self, handle: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| Error::Store("user lock registry poisoned".to_string()))?;
            // Entries nobody holds or waits on are dropped; the registry stays
            // as large as the set of handles in flight.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(handle.to_string()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Pulls the full history and folds every new solve into the record.
    pub async fn sync(&self, handle: &str) -> Result<SyncReport> {
        let span = tracing::info_span!("sync", handle, run_id = %Uuid::new_v4());
        self.sync_locked(handle).instrument(span).await
    }

    async fn sync_locked(&self, handle: &str) -> Result<SyncReport> {
        let _guard = self.lock_user(handle).await?;
        let attempts = self.history.fetch(handle).await?;
        let mut record = self.store.load(handle)?;
        let report = self
            .engine
            .apply_history(&mut record, attempts, (self.clock)());
        self.store.commit(handle, &record)?;
        tracing::info!(
            solved = report.solved,
            unsolved = report.unsolved,
            skipped = report.skipped,
            bins = report.bins_touched,
            "sync committed"
        );
        Ok(report)
    }

    pub async fn submit(&self, handle: &str, solve: ManualSolve) -> Result<Submission> {
        let span = tracing::info_span!(
            "submit",
            handle,
            problem = %solve.problem_id,
            run_id = %Uuid::new_v4()
        );
        self.submit_locked(handle, solve).instrument(span).await
    }

    async fn submit_locked(&self, handle: &str, solve: ManualSolve) -> Result<Submission> {
        let problem_id: ProblemId = solve.problem_id.parse()?;
        let _guard = self.lock_user(handle).await?;
        let mut record = self.store.load(handle)?;
        if record.is_solved(&problem_id.to_string()) {
            return Err(Error::AlreadySolved(problem_id.to_string()));
        }

        let attempts = self.history.fetch(handle).await?;
        let submission = self.engine.apply_manual_solve(
            &mut record,
            &problem_id,
            &attempts,
            solve.time_spent_minutes,
            (self.clock)(),
        )?;
        self.store.commit(handle, &record)?;
        tracing::info!(
            attempts = submission.attempts,
            credit = submission.base_credit(),
            "solve credited"
        );
        Ok(submission)
    }

    /// Every topic's standing, refreshed to the current window and saved.
    pub async fn stats(&self, handle: &str) -> Result<BTreeMap<String, MasteryResult>> {
        let _guard = self.lock_user(handle).await?;
        let mut record = self.store.load(handle)?;
        self.engine.refresh_all(&mut record, (self.clock)());
        self.store.commit(handle, &record)?;
        Ok(self.engine.stats(&record).into_iter().collect())
    }

    fn current_record(&self, handle: &str) -> Result<UserRecord> {
        let mut record = self.store.load(handle)?;
        self.engine.refresh_all(&mut record, (self.clock)());
        Ok(record)
    }

    pub fn recommend(
        &self,
        handle: &str,
        topic: &str,
        increment: i32,
        k: usize,
    ) -> Result<Vec<Problem>> {
        let record = self.current_record(handle)?;
        let snapshot = record.snapshot();
        let solved = record.solved();
        Ok(Recommender::new(&self.catalog, &snapshot, &solved).recommend(topic, increment, k))
    }

    pub fn daily<R: Rng + ?Sized>(&self, handle: &str, rng: &mut R) -> Result<Option<Problem>> {
        let record = self.current_record(handle)?;
        let snapshot = record.snapshot();
        let solved = record.solved();
        Ok(Recommender::new(&self.catalog, &snapshot, &solved).daily(rng))
    }

    pub fn recent(&self, handle: &str, k: usize, status: SolveStatus) -> Result<Vec<RecentProblem>> {
        let record = self.store.load(handle)?;
        Ok(record
            .recent(k, status)
            .into_iter()
            .map(|(id, problem)| {
                let known = self.catalog.get(id);
                RecentProblem {
                    problem_id: id.to_string(),
                    status: problem.status,
                    last_attempted_at: problem.last_attempted_at,
                    name: known.map(|p| p.name.clone()),
                    rating: known.map(|p| p.rating),
                    topics: known.map(|p| p.topics.clone()).unwrap_or_default(),
                }
            })
            .collect())
    }
}
