pub mod canonical;
pub mod markdown;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::ExtractionConfig;

/// Normalised representation of one archived HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub page_id: String,
    pub url: String,
    pub file_path: PathBuf,
    pub title: String,
    pub markdown: String,
    pub headings: Vec<String>,
    pub links: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

/// Candidate containers for the readable article body, most specific first.
const READABLE_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[role="main"]"#,
    "#content",
    ".content",
    "body",
];

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static HEADING_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["h1", "h2", "h3"]
        .iter()
        .map(|level| Selector::parse(level).unwrap())
        .collect()
});

/// Pulls article-like content out of rendered HTML.
pub struct ContentExtractor {
    config: ExtractionConfig,
    readable: Vec<Selector>,
}

impl ContentExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        let readable = READABLE_SELECTORS
            .iter()
            .map(|selector| Selector::parse(selector).unwrap())
            .collect();
        Self { config, readable }
    }

    pub fn extract(
        &self,
        page_id: &str,
        html: &str,
        url: &str,
        file_path: &Path,
        captured_at: DateTime<Utc>,
    ) -> Result<ExtractedPage> {
        let document = Html::parse_document(html);
        let canonical_url = canonical::infer_canonical_url(&document, url, file_path);
        let (title, fragment) = self.readable_fragment(&document)?;
        let headings = if self.config.preserve_headings {
            collect_headings(fragment)
        } else {
            Vec::new()
        };
        let links = collect_links(&document, &canonical_url);
        let markdown = markdown::element_to_markdown(fragment);
        Ok(ExtractedPage {
            page_id: page_id.to_string(),
            url: canonical_url,
            file_path: file_path.to_path_buf(),
            title,
            markdown,
            headings,
            links,
            captured_at,
        })
    }

    /// The first candidate container with enough readable text; otherwise
    /// the longest candidate (plain-text fallback must be enabled for that).
    fn readable_fragment<'a>(&self, document: &'a Html) -> Result<(String, ElementRef<'a>)> {
        let title = document_title(document);
        let mut best: Option<(usize, ElementRef<'a>)> = None;
        for selector in &self.readable {
            let Some(element) = document.select(selector).next() else {
                continue;
            };
            let length = plain_text_length(element);
            if length >= self.config.min_content_characters {
                return Ok((title, element));
            }
            if best.map_or(true, |(best_length, _)| length > best_length) {
                best = Some((length, element));
            }
        }
        if !self.config.fallback_plain_text {
            bail!(
                "no readable container reached {} characters and plain-text fallback is disabled",
                self.config.min_content_characters
            );
        }
        match best {
            Some((_, element)) => Ok((title, element)),
            None => Ok((title, document.root_element())),
        }
    }
}

fn document_title(document: &Html) -> String {
    if let Some(title) = document.select(&TITLE_SELECTOR).next() {
        let text = markdown::inline_text(title);
        if !text.is_empty() {
            return text;
        }
    }
    document
        .select(&H1_SELECTOR)
        .next()
        .map(markdown::inline_text)
        .unwrap_or_default()
}

fn plain_text_length(element: ElementRef) -> usize {
    markdown::inline_text(element).chars().count()
}

fn collect_headings(fragment: ElementRef) -> Vec<String> {
    let mut headings = Vec::new();
    for selector in HEADING_SELECTORS.iter() {
        for node in fragment.select(selector) {
            let text = markdown::inline_text(node);
            if !text.is_empty() {
                headings.push(text);
            }
        }
    }
    headings
}

/// All resolvable outbound links of the document, fragment-free, deduped and
/// sorted. Self-links and non-navigational schemes are dropped.
fn collect_links(document: &Html, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let mut links: BTreeSet<String> = BTreeSet::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        let resolved = match &base {
            Some(base) => base.join(href).ok(),
            None => Url::parse(href).ok(),
        };
        let Some(mut resolved) = resolved else {
            continue;
        };
        resolved.set_fragment(None);
        let resolved = resolved.to_string();
        if resolved.is_empty() || resolved == base_url {
            continue;
        }
        links.insert(resolved);
    }
    links.into_iter().collect()
}

// ── Tests ──
