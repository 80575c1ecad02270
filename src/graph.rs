use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub slug: String,
    pub display_name: String,
}

impl Topic {
    pub fn new(slug: &str) -> Self {
        Topic {
            slug: slug.to_string(),
            display_name: display_name(slug),
        }
    }
}

/// `parent` is a prerequisite of `child`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicEdge {
    pub parent: String,
    pub child: String,
}

impl TopicEdge {
    pub fn new(parent: &str, child: &str) -> Self {
        TopicEdge {
            parent: parent.to_string(),
            child: child.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicGraph {
    pub topics: Vec<Topic>,
    pub edges: Vec<TopicEdge>,
}

impl TopicGraph {
    pub fn new(topics: Vec<Topic>, edges: Vec<TopicEdge>) -> Self {
        TopicGraph { topics, edges }
    }

    /// Reads `slug,display_name` rows and `parent,child` rows. Both files carry a header.
    pub fn load_csv(topics_path: &Path, edges_path: &Path) -> Result<Self> {
        let mut topics = Vec::new();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(topics_path)?;
        for record in reader.records() {
            let record = record?;
            let slug = get_field(&record, 0);
            if slug.is_empty() {
                continue;
            }
            let label = get_field(&record, 1);
            topics.push(Topic {
                display_name: if label.is_empty() {
                    display_name(&slug)
                } else {
                    label
                },
                slug,
            });
        }

        let mut edges = Vec::new();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(edges_path)?;
        for record in reader.records() {
            let record = record?;
            let parent = get_field(&record, 0);
            let child = get_field(&record, 1);
            if parent.is_empty() || child.is_empty() {
                continue;
            }
            edges.push(TopicEdge { parent, child });
        }

        Ok(TopicGraph { topics, edges })
    }

    pub fn topic(&self, slug: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.slug == slug)
    }
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").trim().to_string()
}

pub fn display_name(slug: &str) -> String {
    match slug {
        "tree dp" => "Tree DP".to_string(),
        "dynamic programming" => "DP".to_string(),
        _ => slug
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" "),
    }
}

/// Shortest upward (child to parent) hop counts between every topic and each
/// of its ancestors, stored as a dense matrix.
#[derive(Debug, Clone, Default)]
pub struct AncestryIndex {
    slugs: Vec<String>,
    positions: HashMap<String, usize>,
    // distances[from][ancestor]
    distances: Vec<Vec<Option<u32>>>,
}

impl AncestryIndex {
    pub fn build(graph: &TopicGraph) -> Self {
        let mut slugs = Vec::with_capacity(graph.topics.len());
        let mut positions = HashMap::with_capacity(graph.topics.len());
        for topic in &graph.topics {
            if positions.contains_key(&topic.slug) {
                tracing::warn!(topic = %topic.slug, "duplicate topic ignored");
                continue;
            }
            positions.insert(topic.slug.clone(), slugs.len());
            slugs.push(topic.slug.clone());
        }

        let n = slugs.len();
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &graph.edges {
            match (positions.get(&edge.parent), positions.get(&edge.child)) {
                (Some(&parent), Some(&child)) => parents[child].push(parent),
                _ => tracing::warn!(
                    parent = %edge.parent,
                    child = %edge.child,
                    "edge references unknown topic, skipped"
                ),
            }
        }

        let mut distances = Vec::with_capacity(n);
        for start in 0..n {
            let mut row: Vec<Option<u32>> = vec![None; n];
            row[start] = Some(0);
            let mut queue = VecDeque::from([(start, 0u32)]);
            while let Some((current, dist)) = queue.pop_front() {
                for &parent in &parents[current] {
                    // First discovery is the shortest path, and keeps cycles finite.
                    if row[parent].is_none() {
                        row[parent] = Some(dist + 1);
                        queue.push_back((parent, dist + 1));
                    }
                }
            }
            distances.push(row);
        }

        tracing::debug!(topics = n, edges = graph.edges.len(), "ancestry index built");

        AncestryIndex {
            slugs,
            positions,
            distances,
        }
    }

    /// Hops from `topic` up to `ancestor`, or `None` when `ancestor` is not a
    /// prerequisite of `topic` (descendants and siblings included).
    pub fn distance(&self, topic: &str, ancestor: &str) -> Option<u32> {
        let from = *self.positions.get(topic)?;
        let to = *self.positions.get(ancestor)?;
        self.distances[from][to]
    }

    /// Every ancestor of `topic` with its distance, `topic` itself at 0.
    pub fn ancestors<'a>(&'a self, topic: &str) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        let row = self
            .positions
            .get(topic)
            .map(|&i| self.distances[i].as_slice())
            .unwrap_or(&[]);
        row.iter()
            .enumerate()
            .filter_map(|(i, d)| d.map(|d| (self.slugs[i].as_str(), d)))
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.slugs.iter().map(String::as_str)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.positions.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn graph(topics: &[&str], edges: &[(&str, &str)]) -> TopicGraph {
        TopicGraph::new(
            topics.iter().map(|t| Topic::new(t)).collect(),
            edges.iter().map(|(p, c)| TopicEdge::new(p, c)).collect(),
        )
    }

    #[test]
    fn self_distance_is_zero() {
        let index = AncestryIndex::build(&graph(&["a", "b"], &[("a", "b")]));
        for topic in ["a", "b"] {
            assert_eq!(index.distance(topic, topic), Some(0));
        }
    }

    #[test]
    fn parent_is_one_hop_and_child_is_unreachable() {
        let index = AncestryIndex::build(&graph(&["a", "b"], &[("a", "b")]));
        assert_eq!(index.distance("b", "a"), Some(1));
        assert_eq!(index.distance("a", "b"), None);
    }

    #[test]
    fn shortest_of_alternate_paths_wins() {
        // a -> b -> c -> d and a shortcut a -> d
        let index = AncestryIndex::build(&graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("a", "d")],
        ));
        assert_eq!(index.distance("d", "a"), Some(1));
        assert_eq!(index.distance("d", "b"), Some(2));
        assert_eq!(index.distance("d", "c"), Some(1));
    }

    #[test]
    fn siblings_are_not_ancestors() {
        let index = AncestryIndex::build(&graph(
            &["root", "left", "right"],
            &[("root", "left"), ("root", "right")],
        ));
        assert_eq!(index.distance("left", "right"), None);
        assert_eq!(index.distance("left", "root"), Some(1));
    }

    #[test]
    fn cycles_terminate() {
        let index = AncestryIndex::build(&graph(&["a", "b"], &[("a", "b"), ("b", "a")]));
        assert_eq!(index.distance("a", "b"), Some(1));
        assert_eq!(index.distance("b", "a"), Some(1));
        assert_eq!(index.distance("a", "a"), Some(0));
    }

    #[test]
    fn unknown_edges_are_skipped() {
        let index = AncestryIndex::build(&graph(&["a"], &[("ghost", "a")]));
        assert_eq!(index.len(), 1);
        assert_eq!(index.ancestors("a").count(), 1);
    }

    #[test]
    fn ancestors_lists_upward_closure() {
        let index = AncestryIndex::build(&graph(
            &["implementation", "greedy", "dynamic programming", "math"],
            &[
                ("implementation", "greedy"),
                ("greedy", "dynamic programming"),
                ("implementation", "math"),
            ],
        ));
        let mut ancestors: Vec<(&str, u32)> = index.ancestors("dynamic programming").collect();
        ancestors.sort_by_key(|(_, d)| *d);
        assert_eq!(
            ancestors,
            vec![
                ("dynamic programming", 0),
                ("greedy", 1),
                ("implementation", 2)
            ]
        );
        assert_eq!(index.ancestors("unknown").count(), 0);
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name("tree dp"), "Tree DP");
        assert_eq!(display_name("dynamic programming"), "DP");
        assert_eq!(display_name("meet in the middle"), "Meet In The Middle");
    }

    #[test]
    fn load_graph_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let topics = dir.path().join("topics.csv");
        let edges = dir.path().join("edges.csv");
        {
            let mut f = std::fs::File::create(&topics).unwrap();
            writeln!(f, "slug,display_name").unwrap();
            writeln!(f, "implementation,").unwrap();
            writeln!(f, "greedy,Greedy Algorithms").unwrap();
        }
        {
            let mut f = std::fs::File::create(&edges).unwrap();
            writeln!(f, "parent,child").unwrap();
            writeln!(f, "implementation,greedy").unwrap();
        }
        let graph = TopicGraph::load_csv(&topics, &edges).unwrap();
        assert_eq!(graph.topics.len(), 2);
        assert_eq!(graph.topics[0].display_name, "Implementation");
        assert_eq!(graph.topics[1].display_name, "Greedy Algorithms");
        assert_eq!(graph.edges, vec![TopicEdge::new("implementation", "greedy")]);
    }
}
