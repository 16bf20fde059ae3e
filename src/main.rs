mod config;
mod document;
mod env;
mod extract;
mod graph;
mod manifest;
mod pipeline;
mod quality;
mod render;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use serde_json::json;
use tracing::info;

use config::{merge_expand_texts, BuildConfig};

#[derive(Parser, Debug)]
#[command(
    name = "site_distiller",
    about = "Distill an archived HTML tree into grouped Markdown documents with a manifest and grounding report"
)]
struct Args {
    /// Directory containing the archived HTML files
    #[arg(long = "input", value_name = "DIR")]
    input_dir: PathBuf,

    /// Directory for generated documents, manifest and reports
    #[arg(long = "out", value_name = "DIR")]
    output_dir: PathBuf,

    /// Extra expand-button labels to click while rendering, comma separated
    #[arg(long, default_value = "")]
    expand_texts: String,

    /// Print progress logs
    #[arg(short, long)]
    verbose: bool,

    /// Concurrent browser pages while rendering (default: derived from CPUs)
    #[arg(long)]
    render_concurrency: Option<usize>,

    /// Use the local HTML as-is for pages that keep failing to render
    #[arg(long)]
    allow_render_fallback: bool,

    /// Minimum characters before a container counts as the readable body
    #[arg(long)]
    min_content_chars: Option<usize>,

    /// Fail pages whose readable body stays under the minimum
    #[arg(long)]
    no_plain_text_fallback: bool,

    /// Skip heading collection during extraction
    #[arg(long)]
    no_headings: bool,

    /// Pages required before a group becomes a cluster
    #[arg(long)]
    min_cluster_size: Option<usize>,

    /// Keep single-page clusters instead of pooling them
    #[arg(long)]
    allow_singleton_clusters: bool,

    /// Largest community kept intact before it is re-cut
    #[arg(long)]
    max_network_cluster_size: Option<usize>,

    /// Directory depth used for path-based grouping
    #[arg(long)]
    directory_cluster_depth: Option<usize>,

    /// Deepest URL pattern tried when grouping by path shape
    #[arg(long)]
    url_pattern_depth: Option<usize>,

    /// Tf-idf terms considered when labelling clusters
    #[arg(long)]
    label_tfidf_terms: Option<usize>,

    /// Skip the grounding audit
    #[arg(long)]
    no_hallucination_checks: bool,

    /// Body characters below which a page is flagged as thin
    #[arg(long)]
    min_page_chars: Option<usize>,

    /// Flag pages that have no source URL
    #[arg(long)]
    require_source_url: bool,

    /// Shortest label token checked against page bodies
    #[arg(long)]
    label_min_token_length: Option<usize>,

    /// Summary lines derived (and audited) per cluster
    #[arg(long)]
    summary_snippet_limit: Option<usize>,
}

impl Args {
    fn into_config(self, overrides: env::EnvOverrides) -> BuildConfig {
        let mut config = BuildConfig::new(&self.input_dir, &self.output_dir);

        let extras: Vec<String> = self
            .expand_texts
            .split(',')
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect();
        if !extras.is_empty() {
            config.render.expand_texts = merge_expand_texts(&config.render.expand_texts, &extras);
        }
        config.render.max_concurrency = self
            .render_concurrency
            .or(overrides.render_concurrency)
            .map(|value| value.max(1));
        config.render.allow_plain_fallback = self.allow_render_fallback;
        config.render.chrome_executable = overrides.chrome_path;

        if let Some(min_content_chars) = self.min_content_chars {
            config.extract.min_content_characters = min_content_chars;
        }
        if self.no_plain_text_fallback {
            config.extract.fallback_plain_text = false;
        }
        if self.no_headings {
            config.extract.preserve_headings = false;
        }

        if let Some(min_cluster_size) = self.min_cluster_size {
            config.graph.min_cluster_size = min_cluster_size;
        }
        if self.allow_singleton_clusters {
            config.graph.allow_singleton_clusters = true;
        }
        if let Some(max_network_cluster_size) = self.max_network_cluster_size {
            config.graph.max_network_cluster_size = max_network_cluster_size;
        }
        if let Some(directory_cluster_depth) = self.directory_cluster_depth {
            config.graph.directory_cluster_depth = directory_cluster_depth;
        }
        if let Some(url_pattern_depth) = self.url_pattern_depth {
            config.graph.url_pattern_depth = url_pattern_depth;
        }
        if let Some(label_tfidf_terms) = self.label_tfidf_terms {
            config.graph.label_tfidf_terms = label_tfidf_terms;
        }

        if self.no_hallucination_checks {
            config.quality.enable_hallucination_checks = false;
        }
        if let Some(min_page_chars) = self.min_page_chars {
            config.quality.min_page_characters = min_page_chars;
        }
        if self.require_source_url {
            config.quality.require_source_url = true;
        }
        if let Some(label_min_token_length) = self.label_min_token_length {
            config.quality.label_min_token_length = label_min_token_length;
        }
        if let Some(summary_snippet_limit) = self.summary_snippet_limit {
            config.quality.summary_snippet_limit = summary_snippet_limit;
        }

        config
    }
}

fn validate(args: &Args) {
    let mut errors: Vec<String> = Vec::new();
    if !args.input_dir.exists() {
        errors.push(format!(
            "input directory not found: {}",
            args.input_dir.display()
        ));
    } else if !args.input_dir.is_dir() {
        errors.push(format!(
            "input path is not a directory: {}",
            args.input_dir.display()
        ));
    }
    if args.output_dir.exists() && !args.output_dir.is_dir() {
        errors.push(format!(
            "output path is not a directory: {}",
            args.output_dir.display()
        ));
    }
    if args.render_concurrency == Some(0) {
        errors.push("--render-concurrency must be at least 1".to_string());
    }
    if args.min_cluster_size == Some(0) {
        errors.push("--min-cluster-size must be at least 1".to_string());
    }
    if args.max_network_cluster_size == Some(0) {
        errors.push("--max-network-cluster-size must be at least 1".to_string());
    }
    if args.label_tfidf_terms == Some(0) {
        errors.push("--label-tfidf-terms must be at least 1".to_string());
    }
    if args.label_min_token_length == Some(0) {
        errors.push("--label-min-token-length must be at least 1".to_string());
    }
    if args.summary_snippet_limit == Some(0) {
        errors.push("--summary-snippet-limit must be at least 1".to_string());
    }
    if !errors.is_empty() {
        for message in &errors {
            eprintln!("error: {}", message);
        }
        std::process::exit(2);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if args.verbose {
                    "info".into()
                } else {
                    "warn".into()
                }
            }),
        )
        .init();
    validate(&args);

    let overrides = env::load();
    let config = args.into_config(overrides);

    let t0 = Instant::now();
    let result = pipeline::run_build(&config).await?;

    let mut summary = json!({
        "pages": result.pages.len(),
        "clusters": result.clusters.len(),
        "output": config.output.root.display().to_string(),
        "render_fallback_pages": result.render_fallback_pages,
    });
    if !result.render_fallback_reasons.is_empty() {
        summary["render_fallback_reasons"] = json!(result.render_fallback_reasons);
    }
    println!("{}", summary);

    info!("Done in {:.1}s", t0.elapsed().as_secs_f64());
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn minimal_args_use_defaults() {
        let args = parse(&["site_distiller", "--input", "/in", "--out", "/out"]);
        let config = args.into_config(env::EnvOverrides::default());
        assert_eq!(config.input_dir, PathBuf::from("/in"));
        assert_eq!(config.output.root, PathBuf::from("/out"));
        assert!(config.quality.enable_hallucination_checks);
        assert!(!config.render.allow_plain_fallback);
        assert_eq!(config.graph.min_cluster_size, 2);
    }

    #[test]
    fn flag_overrides_reach_the_config() {
        let args = parse(&[
            "site_distiller",
            "--input",
            "/in",
            "--out",
            "/out",
            "--min-cluster-size",
            "3",
            "--url-pattern-depth",
            "5",
            "--allow-singleton-clusters",
            "--no-hallucination-checks",
            "--min-page-chars",
            "200",
            "--allow-render-fallback",
            "--expand-texts",
            "unfold, details",
        ]);
        let config = args.into_config(env::EnvOverrides::default());
        assert_eq!(config.graph.min_cluster_size, 3);
        assert_eq!(config.graph.url_pattern_depth, 5);
        assert!(config.graph.allow_singleton_clusters);
        assert!(!config.quality.enable_hallucination_checks);
        assert_eq!(config.quality.min_page_characters, 200);
        assert!(config.render.allow_plain_fallback);
        assert!(config.render.expand_texts.iter().any(|t| t == "unfold"));
        assert!(config.render.expand_texts.iter().any(|t| t == "details"));
    }

    #[test]
    fn env_overrides_fill_gaps_but_cli_wins() {
        let overrides = env::EnvOverrides {
            chrome_path: Some(PathBuf::from("/usr/bin/chromium")),
            render_concurrency: Some(6),
        };
        let args = parse(&["site_distiller", "--input", "/in", "--out", "/out"]);
        let config = args.into_config(overrides);
        assert_eq!(config.render.max_concurrency, Some(6));
        assert_eq!(
            config.render.chrome_executable,
            Some(PathBuf::from("/usr/bin/chromium"))
        );

        let overrides = env::EnvOverrides {
            chrome_path: None,
            render_concurrency: Some(6),
        };
        let args = parse(&[
            "site_distiller",
            "--input",
            "/in",
            "--out",
            "/out",
            "--render-concurrency",
            "2",
        ]);
        let config = args.into_config(overrides);
        assert_eq!(config.render.max_concurrency, Some(2));
    }
}
