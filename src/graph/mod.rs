pub mod community;
pub mod label;
pub mod pattern;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::GraphConfig;
use crate::extract::ExtractedPage;
use community::{Adjacency, CommunityDetector, GreedyModularity};
use label::{KeywordScorer, TfIdfScorer};

/// A non-overlapping group of pages emitted as one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub cluster_id: String,
    pub label: String,
    pub slug: String,
    pub page_ids: Vec<String>,
}

/// Raised when a cluster references pages absent from the build. This is a
/// bug in the partitioner or caller misuse, never a data-quality issue.
#[derive(Debug, thiserror::Error)]
#[error("clusters reference pages missing from the build: {}", describe_missing(.missing))]
pub struct ClusterResolutionError {
    pub missing: BTreeMap<String, Vec<String>>,
}

fn describe_missing(missing: &BTreeMap<String, Vec<String>>) -> String {
    missing
        .iter()
        .flat_map(|(cluster_id, page_ids)| {
            page_ids
                .iter()
                .map(move |page_id| format!("({}, {})", cluster_id, page_id))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map every cluster to its member pages, in page-id order. Any gap is a
/// structural error enumerating all missing (cluster, page) pairs.
pub fn resolve_clusters<'a>(
    clusters: &[Cluster],
    pages: &'a [ExtractedPage],
) -> Result<BTreeMap<String, Vec<&'a ExtractedPage>>, ClusterResolutionError> {
    let lookup: BTreeMap<&str, &ExtractedPage> = pages
        .iter()
        .map(|page| (page.page_id.as_str(), page))
        .collect();
    let mut resolved: BTreeMap<String, Vec<&ExtractedPage>> = BTreeMap::new();
    let mut missing: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for cluster in clusters {
        let mut members: Vec<&ExtractedPage> = Vec::new();
        for page_id in &cluster.page_ids {
            match lookup.get(page_id.as_str()) {
                Some(page) => members.push(*page),
                None => missing
                    .entry(cluster.cluster_id.clone())
                    .or_default()
                    .push(page_id.clone()),
            }
        }
        resolved.insert(cluster.cluster_id.clone(), members);
    }
    if !missing.is_empty() {
        return Err(ClusterResolutionError { missing });
    }
    Ok(resolved)
}

/// Undirected adjacency over pages whose links resolve to another page's
/// canonical URL. Pages without a URL cannot be targets but still count as
/// link sources. Pure function of its input.
pub fn build_adjacency(pages: &[ExtractedPage]) -> Adjacency {
    let mut url_to_id: BTreeMap<&str, &str> = BTreeMap::new();
    for page in pages {
        if !page.url.is_empty() {
            url_to_id.insert(page.url.as_str(), page.page_id.as_str());
        }
    }
    let mut adjacency = Adjacency::new();
    for page in pages {
        for link in &page.links {
            if let Some(target) = url_to_id.get(link.as_str()) {
                adjacency
                    .entry(page.page_id.clone())
                    .or_default()
                    .insert(target.to_string());
                adjacency
                    .entry(target.to_string())
                    .or_default()
                    .insert(page.page_id.clone());
            }
        }
    }
    adjacency
}

/// Partitions extracted pages into labelled clusters.
///
/// Strategies cascade from most to least structural: link-graph communities,
/// URL patterns, directory layout, and finally host-level pooling of
/// whatever is left. Every page lands in exactly one cluster.
pub struct SiteGraph {
    config: GraphConfig,
    detector: Box<dyn CommunityDetector>,
    scorer: Box<dyn KeywordScorer>,
}

impl SiteGraph {
    pub fn new(config: GraphConfig) -> Self {
        let scorer = TfIdfScorer::from_config(&config);
        Self {
            config,
            detector: Box::new(GreedyModularity),
            scorer: Box::new(scorer),
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn CommunityDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn KeywordScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn cluster(&self, pages: &[ExtractedPage]) -> Vec<Cluster> {
        if pages.is_empty() {
            return Vec::new();
        }
        let adjacency = build_adjacency(pages);
        let mut groups = self.cluster_with_communities(&adjacency);
        if !groups.is_empty() {
            groups = self.refine_large_groups(groups, pages);
        }
        if groups.is_empty() {
            let refs: Vec<&ExtractedPage> = pages.iter().collect();
            let (pattern_groups, remaining) = self.cluster_by_url_pattern(&refs);
            if !pattern_groups.is_empty() {
                groups = pattern_groups;
                if !remaining.is_empty() {
                    let remaining_pages: Vec<&ExtractedPage> = pages
                        .iter()
                        .filter(|page| remaining.contains(&page.page_id))
                        .collect();
                    if !remaining_pages.is_empty() {
                        groups.extend(self.cluster_by_directories(&remaining_pages));
                    }
                }
            } else {
                groups = self.cluster_by_directories(&refs);
            }
        }

        // Total coverage: pages the cascade never assigned ride into the
        // merge stage as singletons.
        let assigned: BTreeSet<String> = groups.iter().flatten().cloned().collect();
        for page in pages {
            if !assigned.contains(&page.page_id) {
                groups.push(BTreeSet::from([page.page_id.clone()]));
            }
        }

        let mut groups = self.merge_small_groups(groups, pages);
        if groups.is_empty() {
            groups = vec![pages.iter().map(|page| page.page_id.clone()).collect()];
        }

        self.assemble(groups, pages)
    }

    // ── Strategies ──

    fn cluster_with_communities(&self, adjacency: &Adjacency) -> Vec<BTreeSet<String>> {
        if adjacency.is_empty() {
            return Vec::new();
        }
        self.detector
            .detect(adjacency)
            .into_iter()
            .filter(|community| community.len() >= self.config.min_cluster_size)
            .collect()
    }

    /// Cap community size: oversized groups are re-cut along URL patterns,
    /// their pattern leftovers along directories, and a total pattern miss
    /// degrades the group to per-page singletons.
    fn refine_large_groups(
        &self,
        groups: Vec<BTreeSet<String>>,
        pages: &[ExtractedPage],
    ) -> Vec<BTreeSet<String>> {
        let threshold = self
            .config
            .max_network_cluster_size
            .max(self.config.min_cluster_size);
        let lookup: BTreeMap<&str, &ExtractedPage> = pages
            .iter()
            .map(|page| (page.page_id.as_str(), page))
            .collect();
        let mut refined: Vec<BTreeSet<String>> = Vec::new();
        for group in groups {
            if group.len() <= threshold {
                refined.push(group);
                continue;
            }
            let subset: Vec<&ExtractedPage> = group
                .iter()
                .filter_map(|page_id| lookup.get(page_id.as_str()).copied())
                .collect();
            if subset.is_empty() {
                continue;
            }
            let (pattern_groups, remaining) = self.cluster_by_url_pattern(&subset);
            if !pattern_groups.is_empty() {
                refined.extend(pattern_groups);
                if !remaining.is_empty() {
                    let remaining_pages: Vec<&ExtractedPage> = remaining
                        .iter()
                        .filter_map(|page_id| lookup.get(page_id.as_str()).copied())
                        .collect();
                    if !remaining_pages.is_empty() {
                        refined.extend(self.cluster_by_directories(&remaining_pages));
                    }
                }
                continue;
            }
            refined.extend(
                group
                    .into_iter()
                    .map(|page_id| BTreeSet::from([page_id])),
            );
        }
        refined
    }

    /// Deeper patterns are more specific, so depths are tried from
    /// `url_pattern_depth` down to 1, keeping the first depth with at least
    /// one non-singleton group.
    fn cluster_by_url_pattern(
        &self,
        pages: &[&ExtractedPage],
    ) -> (Vec<BTreeSet<String>>, BTreeSet<String>) {
        let max_depth = self.config.url_pattern_depth.max(1);
        let mut best: Option<(Vec<BTreeSet<String>>, BTreeSet<String>)> = None;
        for depth in (1..=max_depth).rev() {
            let (groups, remaining) = self.cluster_by_url_pattern_with_depth(pages, depth);
            if !groups.is_empty() && !all_singletons(&groups) {
                return (groups, remaining);
            }
            if !groups.is_empty() && best.is_none() {
                best = Some((groups, remaining));
            }
        }
        best.unwrap_or_default()
    }

    fn cluster_by_url_pattern_with_depth(
        &self,
        pages: &[&ExtractedPage],
        depth: usize,
    ) -> (Vec<BTreeSet<String>>, BTreeSet<String>) {
        let mut buckets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for page in pages {
            let key = pattern::extract_url_pattern(&page.url, depth);
            if key.is_empty() {
                continue;
            }
            buckets.entry(key).or_default().insert(page.page_id.clone());
        }
        if buckets.is_empty() {
            return (Vec::new(), BTreeSet::new());
        }
        let mut groups: Vec<BTreeSet<String>> = Vec::new();
        let mut assigned: BTreeSet<String> = BTreeSet::new();
        for members in buckets.values() {
            if members.len() >= self.config.min_cluster_size {
                groups.push(members.clone());
                assigned.extend(members.iter().cloned());
            }
        }
        let remaining: BTreeSet<String> = pages
            .iter()
            .filter(|page| !assigned.contains(&page.page_id))
            .map(|page| page.page_id.clone())
            .collect();
        (groups, remaining)
    }

    fn cluster_by_directories(&self, pages: &[&ExtractedPage]) -> Vec<BTreeSet<String>> {
        let depth = self.config.directory_cluster_depth.max(1);
        let mut buckets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for page in pages {
            let key = pattern::directory_key(&page.file_path, depth);
            buckets.entry(key).or_default().insert(page.page_id.clone());
        }
        let threshold = self.config.min_cluster_size.max(2);
        buckets
            .into_values()
            .filter(|members| members.len() >= threshold)
            .collect()
    }

    /// Pool sub-threshold groups by host-level directory key; pools that are
    /// still too small collapse into one final catch-all group.
    fn merge_small_groups(
        &self,
        groups: Vec<BTreeSet<String>>,
        pages: &[ExtractedPage],
    ) -> Vec<BTreeSet<String>> {
        let threshold = self.config.min_cluster_size.max(2);
        if self.config.allow_singleton_clusters {
            return groups;
        }
        let lookup: BTreeMap<&str, &ExtractedPage> = pages
            .iter()
            .map(|page| (page.page_id.as_str(), page))
            .collect();
        let (large, small): (Vec<BTreeSet<String>>, Vec<BTreeSet<String>>) = groups
            .into_iter()
            .partition(|group| group.len() >= threshold);
        let small_ids: Vec<String> = small.into_iter().flatten().collect();
        if small_ids.is_empty() {
            return large;
        }
        let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for page_id in small_ids {
            let Some(page) = lookup.get(page_id.as_str()) else {
                continue;
            };
            let key = pattern::directory_key(&page.file_path, 0);
            buckets.entry(key).or_default().push(page_id);
        }
        let mut merged: Vec<BTreeSet<String>> = Vec::new();
        let mut leftovers: Vec<String> = Vec::new();
        for members in buckets.into_values() {
            if members.len() >= threshold {
                merged.push(members.into_iter().collect());
            } else {
                leftovers.extend(members);
            }
        }
        if !leftovers.is_empty() {
            merged.push(leftovers.into_iter().collect());
        }
        large.into_iter().chain(merged).collect()
    }

    // ── Labelling ──

    fn assemble(&self, groups: Vec<BTreeSet<String>>, pages: &[ExtractedPage]) -> Vec<Cluster> {
        let lookup: BTreeMap<&str, &ExtractedPage> = pages
            .iter()
            .map(|page| (page.page_id.as_str(), page))
            .collect();
        let mut used_slugs: BTreeSet<String> = BTreeSet::new();
        let mut clusters: Vec<Cluster> = Vec::new();
        for (idx, group) in groups.into_iter().enumerate() {
            let ordinal = idx + 1;
            let page_ids: Vec<String> = group.into_iter().collect();
            let ordered: Vec<&ExtractedPage> = page_ids
                .iter()
                .filter_map(|page_id| lookup.get(page_id.as_str()).copied())
                .collect();
            let label = self.infer_label(&ordered);
            let slug = ensure_unique_slug(&slugify(&label), &mut used_slugs, ordinal);
            clusters.push(Cluster {
                cluster_id: format!("cl_{}", slug),
                label: if label.is_empty() {
                    format!("Cluster {}", ordinal)
                } else {
                    label
                },
                slug,
                page_ids,
            });
        }
        clusters
    }

    fn infer_label(&self, pages: &[&ExtractedPage]) -> String {
        if pages.is_empty() {
            return String::new();
        }
        let text_label = self.infer_label_from_text(pages);
        if !text_label.is_empty() {
            return text_label;
        }
        let urls: Vec<&str> = pages.iter().map(|page| page.url.as_str()).collect();
        let url_label = label::common_url_prefix_label(&urls);
        if !url_label.is_empty() {
            return url_label;
        }
        first_significant_prefix(&pages[0].markdown, 50)
    }

    fn infer_label_from_text(&self, pages: &[&ExtractedPage]) -> String {
        let documents: Vec<&str> = pages
            .iter()
            .map(|page| page.markdown.as_str())
            .filter(|markdown| !markdown.trim().is_empty())
            .collect();
        if documents.is_empty() {
            return String::new();
        }
        let terms = self.scorer.top_terms(&documents, 3);
        if terms.is_empty() {
            return first_significant_prefix(documents[0], 50);
        }
        terms.join(" ")
    }
}

fn all_singletons(groups: &[BTreeSet<String>]) -> bool {
    groups.iter().all(|group| group.len() == 1)
}

fn first_significant_prefix(text: &str, max_chars: usize) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(max_chars).collect())
        .unwrap_or_default()
}

fn slugify(value: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn ensure_unique_slug(slug: &str, used: &mut BTreeSet<String>, ordinal: usize) -> String {
    let base = if slug.is_empty() {
        format!("cluster-{:02}", ordinal)
    } else {
        slug.to_string()
    };
    let mut candidate = base.clone();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{}-{:02}", base, suffix);
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

// ── Tests ──
