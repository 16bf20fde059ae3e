use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::json;
use tracing::info;
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::document::{build_markdown, write_markdown};
use crate::extract::{ContentExtractor, ExtractedPage};
use crate::graph::{resolve_clusters, Cluster, SiteGraph};
use crate::manifest::{build_manifest, write_manifest};
use crate::quality::HallucinationGuard;
use crate::render::{render_paths, RenderMode, RenderedPage};

const SUMMARY_LOG: &str = "build_summary.json";
const REPORT_FILE: &str = "hallucination_report.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Outcome of a full build.
pub struct BuildResult {
    pub pages: Vec<ExtractedPage>,
    pub clusters: Vec<Cluster>,
    pub render_fallback_pages: usize,
    pub render_fallback_reasons: Vec<String>,
}

/// Run the whole pipeline: discover, render, extract, cluster, write.
pub async fn run_build(config: &BuildConfig) -> Result<BuildResult> {
    prepare_output_dirs(config)?;
    let log = StageLog::new(config);

    let html_paths = discover_html_files(&config.input_dir);
    info!("Discovered {} HTML files", html_paths.len());
    log.record("discovered", json!({ "total_html": html_paths.len() }));

    let rendered = render_paths(&html_paths, &config.render).await?;
    info!("Rendered {} pages", rendered.len());
    log.record(
        "rendered",
        json!({ "total_html": html_paths.len(), "rendered": rendered.len() }),
    );

    let pages = extract_pages(&rendered, config)?;
    log.record("extracted", json!({ "extracted": pages.len() }));

    let clusters = SiteGraph::new(config.graph.clone()).cluster(&pages);
    info!("Clustering produced {} clusters", clusters.len());
    log.record("clustering", json!({ "clusters": clusters.len() }));

    // Writers and the guard both consume this resolution; a gap here aborts
    // the build with every missing pair spelled out.
    let resolved = resolve_clusters(&clusters, &pages)?;

    let mut documents = 0usize;
    for cluster in &clusters {
        let members = &resolved[&cluster.cluster_id];
        let markdown = build_markdown(cluster, members, config.created_at);
        let doc_name = if cluster.slug.is_empty() {
            cluster.cluster_id.as_str()
        } else {
            cluster.slug.as_str()
        };
        let doc_path = config.output.docs_dir.join(format!("{}.md", doc_name));
        write_markdown(&doc_path, &markdown)?;
        documents += 1;
        log.record(
            "writing",
            json!({
                "documents_count": documents,
                "last_document": doc_path.display().to_string(),
            }),
        );
    }
    info!("Wrote {} documents", documents);

    let manifest = build_manifest(&pages, &clusters);
    write_manifest(&config.output.root.join(MANIFEST_FILE), &manifest)?;
    info!("Wrote {}", MANIFEST_FILE);

    if config.quality.enable_hallucination_checks {
        let guard = HallucinationGuard::new(config.quality.clone());
        let report = guard.inspect(&clusters, &resolved)?;
        let report_path = config.output.logs_dir.join(REPORT_FILE);
        fs::write(&report_path, report.to_json()?)
            .with_context(|| format!("writing {}", report_path.display()))?;
        info!(
            "Grounding audit: {} findings over {} clusters",
            report.findings.len(),
            report.inspected_clusters
        );
        log.record("quality", json!({ "findings": report.findings.len() }));
    }

    let render_fallback_pages = rendered
        .iter()
        .filter(|page| page.mode == RenderMode::Plain)
        .count();
    let mut render_fallback_reasons: Vec<String> = rendered
        .iter()
        .filter_map(|page| page.fallback_reason.clone())
        .collect();
    render_fallback_reasons.sort();
    render_fallback_reasons.dedup();

    log.record(
        "completed",
        json!({
            "pages": pages.len(),
            "clusters": clusters.len(),
            "documents": documents,
        }),
    );

    Ok(BuildResult {
        pages,
        clusters,
        render_fallback_pages,
        render_fallback_reasons,
    })
}

fn prepare_output_dirs(config: &BuildConfig) -> Result<()> {
    for dir in [
        &config.output.root,
        &config.output.docs_dir,
        &config.output.logs_dir,
    ] {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    // Start each build with a fresh stage log.
    fs::write(config.output.logs_dir.join(SUMMARY_LOG), "")
        .with_context(|| "truncating the stage log")?;
    Ok(())
}

fn discover_html_files(input_dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    let lowered = ext.to_lowercase();
                    lowered == "html" || lowered == "htm"
                })
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}

fn extract_pages(rendered: &[RenderedPage], config: &BuildConfig) -> Result<Vec<ExtractedPage>> {
    let extractor = ContentExtractor::new(config.extract.clone());
    let pb = ProgressBar::new(rendered.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );
    let pages: Result<Vec<ExtractedPage>> = rendered
        .par_iter()
        .enumerate()
        .map(|(index, page)| {
            let page_id = format!("pg_{:03}", index + 1);
            let captured_at = infer_captured_at(&page.source_path, config.created_at);
            let extracted = extractor.extract(
                &page_id,
                &page.final_html,
                &page.final_url,
                &page.source_path,
                captured_at,
            );
            pb.inc(1);
            extracted
        })
        .collect();
    pb.finish_and_clear();
    pages
}

fn infer_captured_at(path: &Path, fallback: DateTime<Utc>) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(fallback)
}

/// Append-only JSONL log of pipeline stages, one object per transition.
struct StageLog {
    path: PathBuf,
    base: serde_json::Map<String, serde_json::Value>,
}

impl StageLog {
    fn new(config: &BuildConfig) -> Self {
        let mut base = serde_json::Map::new();
        base.insert(
            "input_dir".to_string(),
            json!(config.input_dir.display().to_string()),
        );
        base.insert(
            "output_dir".to_string(),
            json!(config.output.root.display().to_string()),
        );
        base.insert("created_at".to_string(), json!(config.created_at.to_rfc3339()));
        Self {
            path: config.output.logs_dir.join(SUMMARY_LOG),
            base,
        }
    }

    fn record(&self, stage: &str, extra: serde_json::Value) {
        let mut payload = self.base.clone();
        if let serde_json::Value::Object(extra) = extra {
            payload.extend(extra);
        }
        payload.insert("stage".to_string(), json!(stage));
        let line = serde_json::Value::Object(payload).to_string();
        let appended = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                use std::io::Write;
                writeln!(file, "{}", line)
            });
        if let Err(err) = appended {
            tracing::debug!("Stage log write failed: {}", err);
        }
    }
}

// ── Tests ──
