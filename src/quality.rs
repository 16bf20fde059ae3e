use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::QualityConfig;
use crate::document::summary_snippets;
use crate::extract::ExtractedPage;
use crate::graph::{Cluster, ClusterResolutionError};

static LABEL_TOKEN_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-/|,_]+").unwrap());

/// What a finding is about. Serialized as snake_case in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    EmptyCluster,
    InsufficientContent,
    MissingSourceUrl,
    LabelNotInContent,
    SummaryNotInSource,
    InsufficientSummaryCoverage,
}

/// One detected grounding problem. Advisory only.
#[derive(Debug, Clone, Serialize)]
pub struct HallucinationFinding {
    pub cluster_id: String,
    pub page_id: Option<String>,
    pub kind: FindingKind,
    pub message: String,
}

/// Aggregate result of a guard pass.
#[derive(Debug, Serialize)]
pub struct HallucinationReport {
    pub inspected_clusters: usize,
    pub inspected_pages: usize,
    pub findings: Vec<HallucinationFinding>,
}

impl HallucinationReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Audits finalized clusters against their source pages. Findings never fail
/// a build; only a cluster whose pages were never resolved is an error.
pub struct HallucinationGuard {
    config: QualityConfig,
}

impl HallucinationGuard {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn inspect(
        &self,
        clusters: &[Cluster],
        resolved_pages: &BTreeMap<String, Vec<&ExtractedPage>>,
    ) -> Result<HallucinationReport, ClusterResolutionError> {
        let mut unresolved: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for cluster in clusters {
            if !resolved_pages.contains_key(&cluster.cluster_id) {
                unresolved.insert(cluster.cluster_id.clone(), cluster.page_ids.clone());
            }
        }
        if !unresolved.is_empty() {
            return Err(ClusterResolutionError { missing: unresolved });
        }

        let mut findings: Vec<HallucinationFinding> = Vec::new();
        let mut inspected_pages = 0usize;
        for cluster in clusters {
            let pages = &resolved_pages[&cluster.cluster_id];
            inspected_pages += pages.len();
            if pages.is_empty() {
                findings.push(HallucinationFinding {
                    cluster_id: cluster.cluster_id.clone(),
                    page_id: None,
                    kind: FindingKind::EmptyCluster,
                    message: "no pages resolved for this cluster".to_string(),
                });
                continue;
            }
            self.check_page_quality(cluster, pages, &mut findings);
            self.check_label_grounding(cluster, pages, &mut findings);
            self.check_summary_grounding(cluster, pages, &mut findings);
        }
        Ok(HallucinationReport {
            inspected_clusters: clusters.len(),
            inspected_pages,
            findings,
        })
    }

    // ── Checks ──

    fn check_page_quality(
        &self,
        cluster: &Cluster,
        pages: &[&ExtractedPage],
        findings: &mut Vec<HallucinationFinding>,
    ) {
        let min_chars = self.config.min_page_characters;
        for page in pages {
            let length = page.markdown.trim().chars().count();
            if length < min_chars {
                findings.push(HallucinationFinding {
                    cluster_id: cluster.cluster_id.clone(),
                    page_id: Some(page.page_id.clone()),
                    kind: FindingKind::InsufficientContent,
                    message: format!(
                        "page body has only {} characters (threshold: {})",
                        length, min_chars
                    ),
                });
            }
            if self.config.require_source_url && page.url.is_empty() {
                findings.push(HallucinationFinding {
                    cluster_id: cluster.cluster_id.clone(),
                    page_id: Some(page.page_id.clone()),
                    kind: FindingKind::MissingSourceUrl,
                    message: "page has no source URL, provenance cannot be traced".to_string(),
                });
            }
        }
    }

    /// Every label token of a minimum length must occur somewhere in the
    /// member bodies. Case-insensitive substring matching, nothing smarter.
    fn check_label_grounding(
        &self,
        cluster: &Cluster,
        pages: &[&ExtractedPage],
        findings: &mut Vec<HallucinationFinding>,
    ) {
        if cluster.label.is_empty() {
            return;
        }
        let combined: String = pages
            .iter()
            .filter(|page| !page.markdown.is_empty())
            .map(|page| page.markdown.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        if combined.trim().is_empty() {
            return;
        }
        let min_token_length = self.config.label_min_token_length.max(1);
        let label = cluster.label.to_lowercase();
        for token in LABEL_TOKEN_SPLIT_RE.split(&label) {
            if token.is_empty() || token.chars().count() < min_token_length {
                continue;
            }
            if !combined.contains(token) {
                findings.push(HallucinationFinding {
                    cluster_id: cluster.cluster_id.clone(),
                    page_id: None,
                    kind: FindingKind::LabelNotInContent,
                    message: format!(
                        "label token '{}' does not appear in any member page body",
                        token
                    ),
                });
            }
        }
    }

    /// Re-derive the same snippets the document summary shows and verify
    /// each appears verbatim in its source page.
    fn check_summary_grounding(
        &self,
        cluster: &Cluster,
        pages: &[&ExtractedPage],
        findings: &mut Vec<HallucinationFinding>,
    ) {
        let limit = self.config.summary_snippet_limit.max(1);
        let snippets = summary_snippets(pages, limit);
        if snippets.is_empty() {
            return;
        }
        let lookup: BTreeMap<&str, &ExtractedPage> = pages
            .iter()
            .map(|page| (page.page_id.as_str(), *page))
            .collect();
        for (page_id, snippet) in &snippets {
            let Some(page) = lookup.get(page_id.as_str()) else {
                continue;
            };
            if snippet.is_empty() {
                continue;
            }
            if !page.markdown.contains(snippet.as_str()) {
                findings.push(HallucinationFinding {
                    cluster_id: cluster.cluster_id.clone(),
                    page_id: Some(page_id.clone()),
                    kind: FindingKind::SummaryNotInSource,
                    message: "summary line not found in the source page body".to_string(),
                });
            }
        }
        if snippets.len() < pages.len().min(limit) {
            findings.push(HallucinationFinding {
                cluster_id: cluster.cluster_id.clone(),
                page_id: None,
                kind: FindingKind::InsufficientSummaryCoverage,
                message: "fewer summary lines than expected could be derived".to_string(),
            });
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn page(page_id: &str, markdown: &str, url: &str) -> ExtractedPage {
        ExtractedPage {
            page_id: page_id.to_string(),
            url: url.to_string(),
            file_path: PathBuf::from(format!("/tmp/{}.html", page_id)),
            title: "title".to_string(),
            markdown: markdown.to_string(),
            headings: Vec::new(),
            links: Vec::new(),
            captured_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn cluster(label: &str, page_ids: &[&str]) -> Cluster {
        Cluster {
            cluster_id: "cl_test".to_string(),
            label: label.to_string(),
            slug: "test".to_string(),
            page_ids: page_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn guard(config: QualityConfig) -> HallucinationGuard {
        HallucinationGuard::new(config)
    }

    fn resolved<'a>(
        cluster: &Cluster,
        pages: &'a [ExtractedPage],
    ) -> BTreeMap<String, Vec<&'a ExtractedPage>> {
        BTreeMap::from([(cluster.cluster_id.clone(), pages.iter().collect())])
    }

    #[test]
    fn detects_short_content() {
        let config = QualityConfig {
            min_page_characters: 50,
            ..QualityConfig::default()
        };
        let cluster = cluster("Alpha", &["pg_001"]);
        let pages = vec![page("pg_001", "short text", "https://example.com/")];
        let report = guard(config).inspect(&[cluster.clone()], &resolved(&cluster, &pages)).unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::InsufficientContent));
        assert_eq!(report.inspected_clusters, 1);
        assert_eq!(report.inspected_pages, 1);
    }

    #[test]
    fn flags_ungrounded_label_tokens() {
        let config = QualityConfig {
            label_min_token_length: 4,
            min_page_characters: 0,
            ..QualityConfig::default()
        };
        let cluster = cluster("Secret Feature", &["pg_001"]);
        let pages = vec![page("pg_001", "これは公開済みの概要です。", "https://example.com/")];
        let report = guard(config).inspect(&[cluster.clone()], &resolved(&cluster, &pages)).unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::LabelNotInContent));
    }

    #[test]
    fn grounded_label_token_passes() {
        let config = QualityConfig {
            label_min_token_length: 4,
            min_page_characters: 0,
            ..QualityConfig::default()
        };
        let cluster = cluster("Parser", &["pg_001"]);
        let pages = vec![page(
            "pg_001",
            "Notes about the Parser internals and error recovery.",
            "https://example.com/",
        )];
        let report = guard(config).inspect(&[cluster.clone()], &resolved(&cluster, &pages)).unwrap();
        assert!(!report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::LabelNotInContent));
    }

    #[test]
    fn empty_cluster_reported_not_fatal() {
        let cluster = cluster("Alpha", &[]);
        let resolved = BTreeMap::from([(cluster.cluster_id.clone(), Vec::new())]);
        let report = guard(QualityConfig::default())
            .inspect(&[cluster], &resolved)
            .unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::EmptyCluster));
    }

    #[test]
    fn missing_source_url_only_when_required() {
        let mut config = QualityConfig {
            min_page_characters: 0,
            ..QualityConfig::default()
        };
        let cluster = cluster("alpha notes", &["pg_001"]);
        let pages = vec![page("pg_001", "alpha notes body", "")];

        config.require_source_url = false;
        let report = guard(config.clone())
            .inspect(&[cluster.clone()], &resolved(&cluster, &pages))
            .unwrap();
        assert!(!report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::MissingSourceUrl));

        config.require_source_url = true;
        let report = guard(config)
            .inspect(&[cluster.clone()], &resolved(&cluster, &pages))
            .unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::MissingSourceUrl));
    }

    #[test]
    fn unresolved_cluster_is_an_error() {
        let cluster = cluster("Alpha", &["pg_001"]);
        let err = guard(QualityConfig::default())
            .inspect(&[cluster], &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err.missing["cl_test"], vec!["pg_001"]);
    }

    #[test]
    fn summary_coverage_shortfall_reported() {
        let config = QualityConfig {
            min_page_characters: 0,
            summary_snippet_limit: 3,
            ..QualityConfig::default()
        };
        let cluster = cluster("notes pages", &["pg_001", "pg_002"]);
        // Second page has no summarisable line: only a heading.
        let pages = vec![
            page("pg_001", "First page notes body.", "https://example.com/a"),
            page("pg_002", "# Heading only", "https://example.com/b"),
        ];
        let report = guard(config)
            .inspect(&[cluster.clone()], &resolved(&cluster, &pages))
            .unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::InsufficientSummaryCoverage));
    }

    #[test]
    fn report_serializes_with_stable_keys() {
        let report = HallucinationReport {
            inspected_clusters: 1,
            inspected_pages: 2,
            findings: vec![HallucinationFinding {
                cluster_id: "cl_x".to_string(),
                page_id: None,
                kind: FindingKind::EmptyCluster,
                message: "no pages resolved for this cluster".to_string(),
            }],
        };
        let json = report.to_json().unwrap();
        let clusters_at = json.find("inspected_clusters").unwrap();
        let pages_at = json.find("inspected_pages").unwrap();
        let findings_at = json.find("findings").unwrap();
        assert!(clusters_at < pages_at && pages_at < findings_at);
        assert!(json.contains("\"empty_cluster\""));
        assert!(json.contains("\"page_id\": null"));
    }
}
