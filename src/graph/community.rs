use std::collections::{BTreeMap, BTreeSet};

/// Undirected page-link adjacency, page id -> neighbouring page ids.
pub type Adjacency = BTreeMap<String, BTreeSet<String>>;

/// Pluggable community detection over the link graph.
pub trait CommunityDetector: Send + Sync {
    fn detect(&self, adjacency: &Adjacency) -> Vec<BTreeSet<String>>;
}

/// Trivial detector: never yields communities, forcing the partitioner onto
/// its URL/directory fallbacks.
pub struct NoCommunities;

impl CommunityDetector for NoCommunities {
    fn detect(&self, _adjacency: &Adjacency) -> Vec<BTreeSet<String>> {
        Vec::new()
    }
}

/// Agglomerative modularity maximisation (Clauset-Newman-Moore style).
///
/// Every node starts as its own community; the pair of connected communities
/// with the highest modularity gain is merged until no merge improves
/// modularity. Ties are broken by the lexicographically smallest community
/// pair so results are reproducible for a fixed input.
pub struct GreedyModularity;

impl CommunityDetector for GreedyModularity {
    fn detect(&self, adjacency: &Adjacency) -> Vec<BTreeSet<String>> {
        let mut node_set: BTreeSet<&str> = BTreeSet::new();
        for (node, neighbors) in adjacency {
            node_set.insert(node.as_str());
            for neighbor in neighbors {
                node_set.insert(neighbor.as_str());
            }
        }
        if node_set.is_empty() {
            return Vec::new();
        }
        let nodes: Vec<&str> = node_set.into_iter().collect();
        let index: BTreeMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (*node, idx))
            .collect();

        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (node, neighbors) in adjacency {
            let a = index[node.as_str()];
            for neighbor in neighbors {
                let b = index[neighbor.as_str()];
                if a != b {
                    edges.insert((a.min(b), a.max(b)));
                }
            }
        }
        let edge_count = edges.len();
        if edge_count == 0 {
            return nodes
                .iter()
                .map(|node| BTreeSet::from([node.to_string()]))
                .collect();
        }

        let mut degree = vec![0usize; nodes.len()];
        for (a, b) in &edges {
            degree[*a] += 1;
            degree[*b] += 1;
        }

        // Community id = smallest node index it contains.
        let mut members: BTreeMap<usize, BTreeSet<usize>> =
            (0..nodes.len()).map(|idx| (idx, BTreeSet::from([idx]))).collect();
        let mut community_degree: BTreeMap<usize, usize> =
            degree.iter().copied().enumerate().collect();
        let mut between: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for (a, b) in &edges {
            *between.entry((*a, *b)).or_insert(0) += 1;
        }

        let m = edge_count as f64;
        loop {
            let mut best: Option<((usize, usize), f64)> = None;
            for ((a, b), weight) in &between {
                let gain = (*weight as f64) / m
                    - (community_degree[a] as f64 * community_degree[b] as f64) / (2.0 * m).powi(2);
                let better = match best {
                    None => true,
                    Some((_, best_gain)) => gain > best_gain + 1e-12,
                };
                if better {
                    best = Some(((*a, *b), gain));
                }
            }
            let ((a, b), gain) = match best {
                Some(found) => found,
                None => break,
            };
            if gain <= 1e-12 {
                break;
            }

            // Merge b into a (a < b by key ordering).
            let absorbed = members.remove(&b).unwrap_or_default();
            members.entry(a).or_default().extend(absorbed);
            let absorbed_degree = community_degree.remove(&b).unwrap_or(0);
            *community_degree.entry(a).or_insert(0) += absorbed_degree;

            let stale: Vec<((usize, usize), usize)> = between
                .iter()
                .filter(|((x, y), _)| *x == b || *y == b)
                .map(|(key, weight)| (*key, *weight))
                .collect();
            for (key, weight) in stale {
                between.remove(&key);
                let other = if key.0 == b { key.1 } else { key.0 };
                if other == a {
                    continue; // now internal to the merged community
                }
                *between.entry((a.min(other), a.max(other))).or_insert(0) += weight;
            }
        }

        members
            .values()
            .map(|community| {
                community
                    .iter()
                    .map(|idx| nodes[*idx].to_string())
                    .collect()
            })
            .collect()
    }
}

// ── Tests ──
