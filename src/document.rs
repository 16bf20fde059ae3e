use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::extract::ExtractedPage;
use crate::graph::Cluster;

const SNIPPET_MAX_CHARS: usize = 120;
const SUMMARY_LINES: usize = 3;

/// Representative one-liners, one per page: the first non-blank,
/// non-heading body line, truncated to 120 characters. The grounding guard
/// re-derives these, so the selection logic must stay in one place.
pub fn summary_snippets(pages: &[&ExtractedPage], limit: usize) -> Vec<(String, String)> {
    let mut snippets = Vec::new();
    for page in pages {
        let Some(snippet) = first_significant_line(&page.markdown) else {
            continue;
        };
        snippets.push((page.page_id.clone(), snippet));
        if snippets.len() >= limit {
            break;
        }
    }
    snippets
}

fn first_significant_line(markdown: &str) -> Option<String> {
    for raw_line in markdown.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.chars().count() > SNIPPET_MAX_CHARS {
            let truncated: String = line.chars().take(SNIPPET_MAX_CHARS - 3).collect();
            return Some(format!("{}...", truncated));
        }
        return Some(line.to_string());
    }
    None
}

/// Assemble the Markdown document for one cluster. `pages` must be the
/// cluster's resolved members in page-id order.
pub fn build_markdown(
    cluster: &Cluster,
    pages: &[&ExtractedPage],
    created_at: DateTime<Utc>,
) -> String {
    let source_urls: Vec<&str> = pages
        .iter()
        .filter(|page| !page.url.is_empty())
        .map(|page| page.url.as_str())
        .collect();

    let mut lines: Vec<String> = vec![
        "---".to_string(),
        format!("doc_id: doc_{}", cluster.slug),
        format!("cluster_label: {}", cluster.label),
        format!("cluster_slug: {}", cluster.slug),
        "source_urls:".to_string(),
    ];
    lines.extend(source_urls.iter().map(|url| format!("  - {}", url)));
    lines.push(format!(
        "created_at: {}",
        created_at.format("%Y-%m-%dT%H:%M:%S%z")
    ));
    lines.push(format!("pages: [{}]", cluster.page_ids.join(", ")));
    lines.push("---".to_string());

    lines.push(format!("# {}\n", cluster.label));

    let summary = summary_snippets(pages, SUMMARY_LINES);
    if !summary.is_empty() {
        lines.push("## Overview".to_string());
        lines.extend(summary.iter().map(|(_, snippet)| format!("- {}", snippet)));
        lines.push(String::new());
    }

    if pages.iter().any(|page| !page.headings.is_empty()) {
        lines.push("## Contents".to_string());
        for page in pages {
            for heading in &page.headings {
                lines.push(format!("- {}", heading));
            }
        }
        lines.push(String::new());
    }

    for page in pages {
        let section_title = if page.title.is_empty() {
            page.page_id.as_str()
        } else {
            page.title.as_str()
        };
        lines.push(format!("## {}", section_title));
        let source = if page.url.is_empty() {
            page.file_path.display().to_string()
        } else {
            page.url.clone()
        };
        lines.push(format!("> Source URL: {}", source));
        lines.push(format!("> File path: {}", page.file_path.display()));
        lines.push(format!(
            "> Captured: {}",
            page.captured_at.format("%Y-%m-%d %Z")
        ));
        lines.push(String::new());
        lines.push(page.markdown.trim().to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

pub fn write_markdown(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating document directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("writing document {}", path.display()))
}

// ── Tests ──
