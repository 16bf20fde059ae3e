use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::extract::ExtractedPage;
use crate::graph::Cluster;

/// Per-page manifest record with its owning cluster back-reference.
#[derive(Debug, Clone, Serialize)]
pub struct PageEntry {
    pub page_id: String,
    pub url: String,
    pub file_path: String,
    pub title: String,
    pub cluster_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterEntry {
    pub cluster_id: String,
    pub label: String,
    pub slug: String,
    pub page_ids: Vec<String>,
}

/// The machine-readable index of a build: every page and every cluster.
#[derive(Debug, Serialize)]
pub struct Manifest {
    pub pages: Vec<PageEntry>,
    pub clusters: Vec<ClusterEntry>,
}

impl Manifest {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn build_manifest(pages: &[ExtractedPage], clusters: &[Cluster]) -> Manifest {
    let page_entries = pages
        .iter()
        .map(|page| {
            let cluster_id = clusters
                .iter()
                .find(|cluster| cluster.page_ids.iter().any(|id| id == &page.page_id))
                .map(|cluster| cluster.cluster_id.clone())
                .unwrap_or_default();
            PageEntry {
                page_id: page.page_id.clone(),
                url: page.url.clone(),
                file_path: page.file_path.display().to_string(),
                title: page.title.clone(),
                cluster_id,
                created_at: page.captured_at.format("%Y-%m-%dT%H:%M:%S%z").to_string(),
            }
        })
        .collect();
    let cluster_entries = clusters
        .iter()
        .map(|cluster| ClusterEntry {
            cluster_id: cluster.cluster_id.clone(),
            label: cluster.label.clone(),
            slug: cluster.slug.clone(),
            page_ids: cluster.page_ids.clone(),
        })
        .collect();
    Manifest {
        pages: page_entries,
        clusters: cluster_entries,
    }
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory {}", parent.display()))?;
    }
    let json = manifest.to_json().context("serializing manifest")?;
    fs::write(path, json).with_context(|| format!("writing manifest {}", path.display()))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn page(page_id: &str) -> ExtractedPage {
        ExtractedPage {
            page_id: page_id.to_string(),
            url: format!("https://example.com/{}", page_id),
            file_path: PathBuf::from(format!("/tmp/{}.html", page_id)),
            title: String::new(),
            markdown: String::new(),
            headings: Vec::new(),
            links: Vec::new(),
            captured_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn pages_reference_their_cluster() {
        let pages = vec![page("pg_001"), page("pg_002"), page("pg_003")];
        let clusters = vec![Cluster {
            cluster_id: "cl_docs".to_string(),
            label: "Docs".to_string(),
            slug: "docs".to_string(),
            page_ids: vec!["pg_001".to_string(), "pg_002".to_string()],
        }];
        let manifest = build_manifest(&pages, &clusters);
        assert_eq!(manifest.pages[0].cluster_id, "cl_docs");
        assert_eq!(manifest.pages[1].cluster_id, "cl_docs");
        assert_eq!(manifest.pages[2].cluster_id, "");
        assert_eq!(manifest.clusters.len(), 1);
    }

    #[test]
    fn manifest_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/manifest.json");
        let manifest = build_manifest(&[page("pg_001")], &[]);
        write_manifest(&path, &manifest).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["pages"][0]["page_id"], "pg_001");
        assert!(parsed["clusters"].as_array().unwrap().is_empty());
    }
}
