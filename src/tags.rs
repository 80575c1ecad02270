use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::Result;

/// Maps the judge's raw problem tags onto topic slugs of the prerequisite graph.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    tags: HashMap<String, String>,
    // (required topics, implied topic)
    compounds: Vec<(Vec<String>, String)>,
}

const CODEFORCES_TAGS: &[(&str, &str)] = &[
    ("implementation", "implementation"),
    ("brute force", "implementation"),
    ("constructive algorithms", "ad hoc"),
    ("sortings", "sortings"),
    ("two pointers", "two pointers"),
    ("binary search", "searching"),
    ("ternary search", "searching"),
    ("divide and conquer", "searching"),
    ("meet-in-the-middle", "meet in the middle"),
    ("greedy", "greedy"),
    ("math", "math"),
    ("number theory", "math"),
    ("combinatorics", "math"),
    ("matrices", "math"),
    ("probabilities", "math"),
    ("fft", "advanced math"),
    ("chinese remainder theorem", "advanced math"),
    ("geometry", "geometry"),
    ("graphs", "graphs"),
    ("dfs and similar", "graphs"),
    ("shortest paths", "graphs"),
    ("dsu", "graphs"),
    ("flows", "advanced graphs"),
    ("graph matchings", "advanced graphs"),
    ("2-sat", "advanced graphs"),
    ("trees", "trees"),
    ("strings", "strings"),
    ("hashing", "strings"),
    ("string suffix structures", "advanced strings"),
    ("data structures", "data structures"),
    ("bitmasks", "data structures"),
    ("dp", "dynamic programming"),
];

impl TagMap {
    pub fn new() -> Self {
        TagMap::default()
    }

    /// The Codeforces tag vocabulary, with `trees + dynamic programming` implying `tree dp`.
    pub fn codeforces() -> Self {
        let mut map = TagMap::new();
        for (raw, topic) in CODEFORCES_TAGS {
            map.insert(raw, topic);
        }
        map.add_compound(&["trees", "dynamic programming"], "tree dp");
        map
    }

    pub fn insert(&mut self, raw: &str, topic: &str) {
        self.tags.insert(raw.to_string(), topic.to_string());
    }

    pub fn add_compound(&mut self, requires: &[&str], implies: &str) {
        self.compounds.push((
            requires.iter().map(|s| s.to_string()).collect(),
            implies.to_string(),
        ));
    }

    /// Reads `raw_tag,topic` rows on top of an empty map.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut map = TagMap::new();
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        for record in reader.records() {
            let record = record?;
            let raw = record.get(0).unwrap_or("").trim();
            let topic = record.get(1).unwrap_or("").trim();
            if raw.is_empty() || topic.is_empty() {
                continue;
            }
            map.insert(raw, topic);
        }
        Ok(map)
    }

    /// Deduplicated, sorted topic slugs for a problem's raw tags. Unmapped tags are dropped.
    pub fn topics_for<S: AsRef<str>>(&self, raw_tags: &[S]) -> Vec<String> {
        let mut topics: BTreeSet<String> = raw_tags
            .iter()
            .filter_map(|tag| self.tags.get(tag.as_ref().trim()))
            .cloned()
            .collect();
        for (requires, implies) in &self.compounds {
            if requires.iter().all(|r| topics.contains(r)) {
                topics.insert(implies.clone());
            }
        }
        topics.into_iter().collect()
    }

    /// Every topic this map can produce.
    pub fn topics(&self) -> BTreeSet<&str> {
        self.tags
            .values()
            .map(String::as_str)
            .chain(self.compounds.iter().map(|(_, t)| t.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
