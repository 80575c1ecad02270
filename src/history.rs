use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Contest number plus problem index, written `1520D`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProblemId {
    pub contest: u32,
    pub index: String,
}

impl FromStr for ProblemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, index) = s.split_at(split);
        if digits.is_empty()
            || index.is_empty()
            || !index.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::InvalidProblemId(s.to_string()));
        }
        let contest = digits
            .parse()
            .map_err(|_| Error::InvalidProblemId(s.to_string()))?;
        Ok(ProblemId {
            contest,
            index: index.to_string(),
        })
    }
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.contest, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Ok,
    CompilationError,
    Skipped,
    Testing,
    Rejected(String),
}

impl Verdict {
    pub fn parse(s: &str) -> Verdict {
        match s.trim() {
            "OK" => Verdict::Ok,
            "COMPILATION_ERROR" => Verdict::CompilationError,
            "SKIPPED" => Verdict::Skipped,
            "TESTING" => Verdict::Testing,
            other => Verdict::Rejected(other.to_string()),
        }
    }

    /// Whether the judge actually ran the solution.
    pub fn is_judged(&self) -> bool {
        !matches!(
            self,
            Verdict::CompilationError | Verdict::Skipped | Verdict::Testing
        )
    }
}

/// One raw submission from the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub problem_id: ProblemId,
    pub verdict: Verdict,
    pub rating: Option<i32>,
    /// Raw judge tags, not yet mapped onto topics.
    pub tags: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProblemOutcome {
    Solved {
        attempts: u32,
        solved_at: DateTime<Utc>,
        rating: i32,
        tags: Vec<String>,
    },
    Unsolved {
        last_attempted_at: DateTime<Utc>,
    },
}

/// Walks one problem's attempts in submission order up to the first accepted
/// verdict, counting only judged attempts. `None` for an empty slice.
pub fn scan_problem(attempts: &[Attempt]) -> Option<ProblemOutcome> {
    let mut ordered: Vec<&Attempt> = attempts.iter().collect();
    ordered.sort_by_key(|a| a.submitted_at);

    let mut judged = 0u32;
    for attempt in &ordered {
        if !attempt.verdict.is_judged() {
            continue;
        }
        judged += 1;
        if attempt.verdict == Verdict::Ok {
            return Some(ProblemOutcome::Solved {
                attempts: judged,
                solved_at: attempt.submitted_at,
                rating: attempt.rating.unwrap_or(0),
                tags: attempt.tags.clone(),
            });
        }
    }

    ordered.last().map(|last| ProblemOutcome::Unsolved {
        last_attempted_at: last.submitted_at,
    })
}

pub fn group_by_problem(attempts: Vec<Attempt>) -> BTreeMap<ProblemId, Vec<Attempt>> {
    let mut grouped: BTreeMap<ProblemId, Vec<Attempt>> = BTreeMap::new();
    for attempt in attempts {
        grouped
            .entry(attempt.problem_id.clone())
            .or_default()
            .push(attempt);
    }
    grouped
}

/// Source of a user's raw submission history, in any order.
pub trait HistoryProvider: Send + Sync {
    /// Fails with [`Error::HandleNotFound`] when the handle is unknown.
    fn fetch(&self, handle: &str) -> impl Future<Output = Result<Vec<Attempt>>> + Send;
}

/// Reads `<dir>/<handle>.csv` exports with `problem_id,verdict,rating,tags,submitted_at` rows.
#[derive(Debug, Clone)]
pub struct CsvHistory {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct AttemptRow {
    problem_id: String,
    verdict: String,
    #[serde(default)]
    rating: Option<i32>,
    #[serde(default)]
    tags: String,
    submitted_at: String,
}

impl CsvHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvHistory { dir: dir.into() }
    }

    fn path_for(&self, handle: &str) -> Option<PathBuf> {
        valid_handle(handle).then(|| self.dir.join(format!("{handle}.csv")))
    }
}

/// Handles double as file names, so only a safe character set is accepted and
/// a leading dot (hidden files, `..`) is refused.
pub fn valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && !handle.starts_with('.')
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl HistoryProvider for CsvHistory {
    async fn fetch(&self, handle: &str) -> Result<Vec<Attempt>> {
        let path = self
            .path_for(handle)
            .ok_or_else(|| Error::HandleNotFound(handle.to_string()))?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::HandleNotFound(handle.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        parse_attempts(&path, &bytes)
    }
}

fn parse_attempts(path: &Path, bytes: &[u8]) -> Result<Vec<Attempt>> {
    let invalid = |message: String| Error::InvalidInput {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut attempts = Vec::new();
    for row in reader.deserialize::<AttemptRow>() {
        let row = row?;
        let problem_id = row.problem_id.parse()?;
        let submitted_at = parse_timestamp(&row.submitted_at)
            .ok_or_else(|| invalid(format!("bad timestamp '{}'", row.submitted_at)))?;
        attempts.push(Attempt {
            problem_id,
            verdict: Verdict::parse(&row.verdict),
            rating: row.rating.filter(|&r| r > 0),
            tags: split_list(&row.tags),
            submitted_at,
        });
    }
    Ok(attempts)
}

/// Unix seconds or RFC 3339.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Splits a `;`-separated cell, dropping empty entries.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fixed in-memory histories keyed by handle.
#[derive(Debug, Clone, Default)]
pub struct StaticHistory {
    users: HashMap<String, Vec<Attempt>>,
}

impl StaticHistory {
    pub fn new() -> Self {
        StaticHistory::default()
    }

    pub fn insert(&mut self, handle: &str, attempts: Vec<Attempt>) {
        self.users.insert(handle.to_string(), attempts);
    }
}

impl HistoryProvider for StaticHistory {
    async fn fetch(&self, handle: &str) -> Result<Vec<Attempt>> {
        self.users
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::HandleNotFound(handle.to_string()))
    }
}
