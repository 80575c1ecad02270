use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::history::split_list;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub name: String,
    pub rating: i32,
    /// Topic slugs, already mapped from judge tags.
    pub topics: Vec<String>,
}

impl Problem {
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery<'a> {
    pub topic: &'a str,
    pub min_rating: i32,
    pub max_rating: i32,
    /// Candidates are ordered by distance to this rating.
    pub target: i32,
    pub limit: usize,
}

/// Rated problems indexed by id and by topic.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    problems: Vec<Problem>,
    by_id: HashMap<String, usize>,
    by_topic: HashMap<String, Vec<usize>>,
}

impl Catalog {
    pub fn new(problems: Vec<Problem>) -> Self {
        let mut catalog = Catalog::default();
        for problem in problems {
            if problem.rating <= 0 || problem.topics.is_empty() {
                continue;
            }
            if catalog.by_id.contains_key(&problem.id) {
                tracing::warn!(problem = %problem.id, "duplicate problem, keeping first");
                continue;
            }
            let position = catalog.problems.len();
            catalog.by_id.insert(problem.id.clone(), position);
            for topic in &problem.topics {
                catalog
                    .by_topic
                    .entry(topic.clone())
                    .or_default()
                    .push(position);
            }
            catalog.problems.push(problem);
        }
        catalog
    }

    /// Reads `problem_id,name,rating,tags` rows; tags are `;`-separated topic slugs.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut problems = Vec::new();
        for record in reader.records() {
            let record = record?;
            let id = record.get(0).unwrap_or("").to_string();
            if id.is_empty() {
                continue;
            }
            let rating_raw = record.get(2).unwrap_or("");
            let rating = if rating_raw.is_empty() {
                0
            } else {
                rating_raw.parse().map_err(|_| Error::InvalidInput {
                    path: path.to_path_buf(),
                    message: format!("bad rating '{rating_raw}' for {id}"),
                })?
            };
            problems.push(Problem {
                name: record.get(1).unwrap_or("").to_string(),
                rating,
                topics: split_list(record.get(3).unwrap_or("")),
                id,
            });
        }
        Ok(Catalog::new(problems))
    }

    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.by_id.get(id).map(|&i| &self.problems[i])
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Unsolved problems tagged with the topic inside the rating range, closest
    /// to the target first (ties by id), at most `limit` of them.
    pub fn candidates(&self, query: &CandidateQuery<'_>, solved: &HashSet<String>) -> Vec<&Problem> {
        let mut found: Vec<&Problem> = self
            .by_topic
            .get(query.topic)
            .into_iter()
            .flatten()
            .map(|&i| &self.problems[i])
            .filter(|p| p.rating >= query.min_rating && p.rating <= query.max_rating)
            .filter(|p| !solved.contains(&p.id))
            .collect();
        found.sort_by(|a, b| {
            (a.rating - query.target)
                .abs()
                .cmp(&(b.rating - query.target).abs())
                .then_with(|| a.id.cmp(&b.id))
        });
        found.truncate(query.limit);
        found
    }
}
