//! Match-graph clustering
//!
//! Scored pairs at or above the partition threshold are undirected edges.
//! Connected components become clusters, numbered by their smallest member id.

use crate::similarity::ScoredPair;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A connected component of the match graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub cluster_id: usize,
    /// Member ids, ascending
    pub members: Vec<String>,
    /// Mean score of the member pairs (1.0 for singletons)
    pub score: f64,
}

impl Cluster {
    pub fn is_singleton(&self) -> bool {
        self.members.len() < 2
    }
}

/// Connected components over `ids`; ids without an edge become singletons
pub fn cluster_pairs<'a>(
    ids: impl IntoIterator<Item = &'a str>,
    pairs: &[ScoredPair],
    partition_threshold: f64,
) -> Vec<Cluster> {
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for id in ids {
        adjacency.entry(id).or_default();
    }
    let edges: Vec<&ScoredPair> = pairs
        .iter()
        .filter(|p| p.score >= partition_threshold && p.id_a != p.id_b)
        .collect();
    for pair in &edges {
        adjacency.entry(&pair.id_a).or_default().insert(&pair.id_b);
        adjacency.entry(&pair.id_b).or_default().insert(&pair.id_a);
    }

    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut components: Vec<BTreeSet<&str>> = Vec::new();
    // BTreeMap iteration visits the smallest unvisited id first, so components
    // come out ordered by their smallest member.
    for &start in adjacency.keys() {
        if visited.contains(start) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            component.insert(node);
            if let Some(neighbors) = adjacency.get(node) {
                stack.extend(neighbors.iter().filter(|n| !visited.contains(*n)));
            }
        }
        components.push(component);
    }

    let clusters: Vec<Cluster> = components
        .into_iter()
        .enumerate()
        .map(|(cluster_id, members)| {
            let scores: Vec<f64> = edges
                .iter()
                .filter(|p| members.contains(p.id_a.as_str()))
                .map(|p| p.score)
                .collect();
            let score = if scores.is_empty() {
                1.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            Cluster {
                cluster_id,
                members: members.into_iter().map(str::to_string).collect(),
                score,
            }
        })
        .collect();

    debug!(
        edges = edges.len(),
        clusters = clusters.len(),
        multi_member = clusters.iter().filter(|c| !c.is_singleton()).count(),
        "Clustering complete"
    );
    clusters
}

/// Split multi-member clusters into (to merge, below merge threshold)
pub fn split_by_merge_threshold(clusters: Vec<Cluster>, merge_threshold: f64) -> (Vec<Cluster>, Vec<Cluster>) {
    clusters
        .into_iter()
        .filter(|c| !c.is_singleton())
        .partition(|c| c.score >= merge_threshold)
}
