use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Button/link labels that commonly hide collapsed content. Merged with any
/// labels the user passes via --expand-texts.
pub const DEFAULT_EXPAND_TEXTS: &[&str] = &[
    "more",
    "show more",
    "show all",
    "read more",
    "load more",
    "view more",
    "see more",
    "expand",
    "open all",
    "ver mas",
    "ver más",
    "mostrar mas",
    "weiterlesen",
    "もっと見る",
    "さらに表示",
    "詳細",
    "詳細を見る",
    "すべて表示",
    "全て表示",
    "続きを読む",
    "続きを見る",
    "展開",
    "折りたたみ解除",
];

/// Settings applied while rendering archived HTML in a headless browser.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub scroll_pause: f64,
    pub max_scroll_iterations: usize,
    pub expand_texts: Vec<String>,
    pub render_timeout: f64,
    pub auto_expand_candidates: bool,
    pub max_concurrency: Option<usize>,
    pub max_render_attempts: usize,
    pub timeout_backoff_factor: f64,
    pub post_render_delay: f64,
    pub allow_plain_fallback: bool,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scroll_pause: 0.2,
            max_scroll_iterations: 20,
            expand_texts: DEFAULT_EXPAND_TEXTS.iter().map(|s| s.to_string()).collect(),
            render_timeout: 30.0,
            auto_expand_candidates: true,
            max_concurrency: None,
            max_render_attempts: 2,
            timeout_backoff_factor: 1.6,
            post_render_delay: 0.2,
            allow_plain_fallback: false,
            chrome_executable: None,
        }
    }
}

/// Settings for readable-content extraction.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub preserve_headings: bool,
    pub fallback_plain_text: bool,
    pub min_content_characters: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            preserve_headings: true,
            fallback_plain_text: true,
            min_content_characters: 400,
        }
    }
}

/// Settings for site-graph construction and cluster partitioning.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub min_cluster_size: usize,
    pub label_tfidf_terms: usize,
    pub label_token_pattern: Option<String>,
    pub label_stop_words: Vec<String>,
    pub url_pattern_depth: usize,
    pub max_network_cluster_size: usize,
    pub directory_cluster_depth: usize,
    pub allow_singleton_clusters: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            label_tfidf_terms: 5,
            label_token_pattern: Some(r"[\w一-龥ぁ-んァ-ヶー]+".to_string()),
            label_stop_words: [
                "こと",
                "ため",
                "よう",
                "です",
                "ます",
                "する",
                "いる",
                "ある",
                "なる",
                "この",
                "その",
                "それ",
                "そして",
                "また",
                "など",
                "さらに",
                "しかし",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            url_pattern_depth: 3,
            max_network_cluster_size: 12,
            directory_cluster_depth: 2,
            allow_singleton_clusters: false,
        }
    }
}

/// Settings for the grounding guard.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    pub enable_hallucination_checks: bool,
    pub min_page_characters: usize,
    pub require_source_url: bool,
    pub label_min_token_length: usize,
    pub summary_snippet_limit: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enable_hallucination_checks: true,
            min_page_characters: 80,
            require_source_url: false,
            label_min_token_length: 4,
            summary_snippet_limit: 3,
        }
    }
}

/// Output directory layout: docs/ for generated Markdown, logs/ for reports.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub root: PathBuf,
    pub docs_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl OutputConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let docs_dir = root.join("docs");
        let logs_dir = root.join("logs");
        Self {
            root,
            docs_dir,
            logs_dir,
        }
    }
}

/// Everything a single build needs.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub input_dir: PathBuf,
    pub output: OutputConfig,
    pub render: RenderConfig,
    pub extract: ExtractionConfig,
    pub graph: GraphConfig,
    pub quality: QualityConfig,
    pub created_at: DateTime<Utc>,
}

impl BuildConfig {
    pub fn new(input_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            output: OutputConfig::new(output_dir.as_ref()),
            render: RenderConfig::default(),
            extract: ExtractionConfig::default(),
            graph: GraphConfig::default(),
            quality: QualityConfig::default(),
            created_at: Utc::now(),
        }
    }
}

/// Merge default and user-supplied expand labels, dropping case-insensitive
/// duplicates while preserving order.
pub fn merge_expand_texts(defaults: &[String], extras: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut merged = Vec::new();
    for text in defaults.iter().chain(extras.iter()) {
        let key = text.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        merged.push(text.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_layout() {
        let output = OutputConfig::new("/tmp/out");
        assert_eq!(output.docs_dir, PathBuf::from("/tmp/out/docs"));
        assert_eq!(output.logs_dir, PathBuf::from("/tmp/out/logs"));
    }

    #[test]
    fn expand_texts_dedupe_case_insensitive() {
        let defaults = vec!["More".to_string(), "expand".to_string()];
        let extras = vec!["more".to_string(), "開く".to_string()];
        let merged = merge_expand_texts(&defaults, &extras);
        assert_eq!(merged, vec!["More", "expand", "開く"]);
    }

    #[test]
    fn graph_defaults_sane() {
        let config = GraphConfig::default();
        assert!(config.min_cluster_size >= 1);
        assert!(config.max_network_cluster_size >= 1);
        assert!(config.label_tfidf_terms >= 1);
    }
}
