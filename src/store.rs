use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::history::valid_handle;
use crate::interval::Bin;
use crate::mastery::MasteryResult;
use crate::recommend::MasterySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Solved,
    Unsolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemStatus {
    pub status: SolveStatus,
    pub last_attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopicMastery {
    pub current: f64,
    pub peak: f64,
    pub updated_at: DateTime<Utc>,
}

impl TopicMastery {
    pub fn result(&self) -> MasteryResult {
        MasteryResult {
            current: self.current,
            peak: self.peak,
        }
    }
}

/// Everything persisted for one user. Bins are the source of truth; `mastery`
/// is a cache recomputable from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub problems: BTreeMap<String, ProblemStatus>,
    /// topic -> window index -> bin
    #[serde(default)]
    pub bins: BTreeMap<String, BTreeMap<i64, Bin>>,
    #[serde(default)]
    pub mastery: BTreeMap<String, TopicMastery>,
}

impl UserRecord {
    /// Upserts a problem's status. A solved problem never goes back to unsolved
    /// and the last attempt time only moves forward.
    pub fn mark_problem(&mut self, problem_id: &str, status: SolveStatus, at: DateTime<Utc>) {
        match self.problems.get_mut(problem_id) {
            Some(existing) => {
                if existing.status != SolveStatus::Solved {
                    existing.status = status;
                }
                existing.last_attempted_at = existing.last_attempted_at.max(at);
            }
            None => {
                self.problems.insert(
                    problem_id.to_string(),
                    ProblemStatus {
                        status,
                        last_attempted_at: at,
                    },
                );
            }
        }
    }

    pub fn is_solved(&self, problem_id: &str) -> bool {
        self.problems
            .get(problem_id)
            .is_some_and(|p| p.status == SolveStatus::Solved)
    }

    pub fn solved(&self) -> HashSet<String> {
        self.problems
            .iter()
            .filter(|(_, p)| p.status == SolveStatus::Solved)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn topic_bins(&self, topic: &str) -> Option<&BTreeMap<i64, Bin>> {
        self.bins.get(topic)
    }

    pub fn mastery_of(&self, topic: &str) -> MasteryResult {
        self.mastery
            .get(topic)
            .map(TopicMastery::result)
            .unwrap_or_default()
    }

    /// Stores a freshly computed result. The peak never drops below what was stored.
    pub fn set_mastery(&mut self, topic: &str, result: MasteryResult, at: DateTime<Utc>) {
        let stored_peak = self.mastery_of(topic).peak;
        self.mastery.insert(
            topic.to_string(),
            TopicMastery {
                current: result.current,
                peak: stored_peak.max(result.peak).max(result.current),
                updated_at: at,
            },
        );
    }

    pub fn snapshot(&self) -> MasterySnapshot {
        self.mastery
            .iter()
            .map(|(topic, m)| (topic.clone(), m.result()))
            .collect()
    }

    /// The `k` most recently attempted problems with the given status, newest first.
    pub fn recent(&self, k: usize, status: SolveStatus) -> Vec<(&str, &ProblemStatus)> {
        let mut matching: Vec<(&str, &ProblemStatus)> = self
            .problems
            .iter()
            .filter(|(_, p)| p.status == status)
            .map(|(id, p)| (id.as_str(), p))
            .collect();
        matching.sort_by(|a, b| b.1.last_attempted_at.cmp(&a.1.last_attempted_at));
        matching.truncate(k);
        matching
    }
}

/// Per-user persistence. `commit` replaces the user's whole record at once, so
/// an operation that fails before committing leaves nothing behind.
pub trait Store: Send + Sync {
    /// An unknown user loads as an empty record.
    fn load(&self, handle: &str) -> Result<UserRecord>;
    fn commit(&self, handle: &str, record: &UserRecord) -> Result<()>;
}

/// One JSON document per user under `<dir>/<handle>.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonStore { dir: dir.into() }
    }

    fn path_for(&self, handle: &str) -> Result<PathBuf> {
        if !valid_handle(handle) {
            return Err(Error::HandleNotFound(handle.to_string()));
        }
        Ok(self.dir.join(format!("{handle}.json")))
    }
}

impl Store for JsonStore {
    fn load(&self, handle: &str) -> Result<UserRecord> {
        let path = self.path_for(handle)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, handle: &str, record: &UserRecord) -> Result<()> {
        let path = self.path_for(handle)?;
        std::fs::create_dir_all(&self.dir)?;
        // Write aside, then rename over the old document.
        let tmp = self
            .dir
            .join(format!(".{handle}.{}.tmp", uuid::Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(record)?;
        if let Err(e) = std::fs::write(&tmp, &bytes).and_then(|_| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, handle: &str) -> Result<UserRecord> {
        let users = self
            .users
            .lock()
            .map_err(|_| Error::Store("memory store poisoned".to_string()))?;
        Ok(users.get(handle).cloned().unwrap_or_default())
    }

    fn commit(&self, handle: &str, record: &UserRecord) -> Result<()> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| Error::Store("memory store poisoned".to_string()))?;
        users.insert(handle.to_string(), record.clone());
        Ok(())
    }
}
