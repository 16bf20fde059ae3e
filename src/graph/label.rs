use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use url::Url;

use crate::config::GraphConfig;

const DEFAULT_TOKEN_PATTERN: &str = r"[\w一-龥ぁ-んァ-ヶー]+";
const LANGUAGE_SAMPLE_CHARS: usize = 5000;
const CJK_RATIO_THRESHOLD: f64 = 0.2;
const LATIN_RATIO_THRESHOLD: f64 = 0.5;

/// Compact English stop list for keyword labelling.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need",
    "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "what",
    "which", "who", "whom", "whose", "where", "when", "why", "how", "all", "each", "every",
    "both", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own",
    "same", "so", "than", "too", "very", "just", "also", "now", "here", "using", "used", "use",
];

/// Pluggable keyword extraction for cluster labels.
pub trait KeywordScorer: Send + Sync {
    /// Top `limit` terms over the documents, best first. An empty result
    /// means the caller should fall back to other labelling strategies.
    fn top_terms(&self, documents: &[&str], limit: usize) -> Vec<String>;
}

/// Tf-idf keyword scorer with character-class language detection picking the
/// stop list (English, Japanese from config, or none).
pub struct TfIdfScorer {
    token_re: Regex,
    max_features: usize,
    japanese_stop_words: BTreeSet<String>,
}

impl TfIdfScorer {
    pub fn from_config(config: &GraphConfig) -> Self {
        let token_re = config
            .label_token_pattern
            .as_deref()
            .and_then(|pattern| Regex::new(pattern).ok())
            .unwrap_or_else(|| Regex::new(DEFAULT_TOKEN_PATTERN).unwrap());
        Self {
            token_re,
            max_features: config.label_tfidf_terms.max(1),
            japanese_stop_words: config
                .label_stop_words
                .iter()
                .map(|word| word.to_lowercase())
                .collect(),
        }
    }

    fn tokenize(&self, document: &str, language: &str) -> Vec<String> {
        self.token_re
            .find_iter(document)
            .map(|token| token.as_str().to_lowercase())
            .filter(|token| match language {
                "en" => !ENGLISH_STOP_WORDS.contains(&token.as_str()),
                "ja" => !self.japanese_stop_words.contains(token),
                _ => true,
            })
            .collect()
    }
}

impl KeywordScorer for TfIdfScorer {
    fn top_terms(&self, documents: &[&str], limit: usize) -> Vec<String> {
        if documents.is_empty() || limit == 0 {
            return Vec::new();
        }
        let language = detect_language(documents);
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|document| self.tokenize(document, &language))
            .collect();

        // Vocabulary: the `max_features` most frequent terms overall.
        let mut corpus_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            for token in tokens {
                *corpus_counts.entry(token.as_str()).or_insert(0) += 1;
            }
        }
        if corpus_counts.is_empty() {
            return Vec::new();
        }
        let mut by_frequency: Vec<(&str, usize)> =
            corpus_counts.iter().map(|(term, count)| (*term, *count)).collect();
        by_frequency.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let vocabulary: Vec<&str> = by_frequency
            .into_iter()
            .take(self.max_features)
            .map(|(term, _)| term)
            .collect();

        let total_docs = tokenized.len() as f64;
        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let unique: BTreeSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
            for term in &vocabulary {
                if unique.contains(*term) {
                    *document_frequency.entry(*term).or_insert(0) += 1;
                }
            }
        }

        // Smoothed idf, l2-normalised per document, summed over documents.
        let mut scores: BTreeMap<&str, f64> = BTreeMap::new();
        for tokens in &tokenized {
            let mut term_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for token in tokens {
                if vocabulary.contains(&token.as_str()) {
                    *term_counts.entry(token.as_str()).or_insert(0) += 1;
                }
            }
            let weights: Vec<(&str, f64)> = term_counts
                .iter()
                .map(|(term, count)| {
                    let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
                    let idf = ((1.0 + total_docs) / (1.0 + df)).ln() + 1.0;
                    (*term, *count as f64 * idf)
                })
                .collect();
            let norm = weights
                .iter()
                .map(|(_, weight)| weight * weight)
                .sum::<f64>()
                .sqrt();
            if norm <= 0.0 {
                continue;
            }
            for (term, weight) in weights {
                *scores.entry(term).or_insert(0.0) += weight / norm;
            }
        }

        let mut ranked: Vec<(&str, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(b.0))
        });
        ranked
            .into_iter()
            .take(limit)
            .map(|(term, _)| term.to_string())
            .collect()
    }
}

/// Rough corpus language guess from character-class ratios over a bounded
/// sample: "ja", "en" or "" (unknown).
pub fn detect_language(documents: &[&str]) -> String {
    let sample: String = documents
        .iter()
        .flat_map(|document| document.chars())
        .take(LANGUAGE_SAMPLE_CHARS)
        .collect();
    if sample.is_empty() {
        return String::new();
    }
    let mut japanese = 0usize;
    let mut latin = 0usize;
    let mut alphabetic = 0usize;
    for ch in sample.chars() {
        if ch.is_alphabetic() {
            alphabetic += 1;
            if is_japanese_char(ch) {
                japanese += 1;
            } else if ch.is_ascii_alphabetic() {
                latin += 1;
            }
        }
    }
    if alphabetic == 0 {
        return String::new();
    }
    if japanese as f64 / alphabetic as f64 >= CJK_RATIO_THRESHOLD {
        return "ja".to_string();
    }
    if latin as f64 / alphabetic as f64 >= LATIN_RATIO_THRESHOLD {
        return "en".to_string();
    }
    String::new()
}

fn is_japanese_char(ch: char) -> bool {
    ('一'..='龥').contains(&ch)
        || ('ぁ'..='ゖ').contains(&ch)
        || ('ァ'..='ヺ').contains(&ch)
        || ch == 'ー'
}

/// Longest common URL path prefix across pages with http(s) URLs, prefixed
/// by the host when all pages share one. Empty when nothing is common.
pub fn common_url_prefix_label(urls: &[&str]) -> String {
    let parsed: Vec<Url> = urls
        .iter()
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .filter_map(|url| Url::parse(url).ok())
        .collect();
    if parsed.is_empty() {
        return String::new();
    }
    let hosts: Vec<&str> = parsed.iter().filter_map(|url| url.host_str()).collect();
    let host = match hosts.first() {
        Some(first) if hosts.iter().all(|h| h == first) => first.to_string(),
        _ => String::new(),
    };

    let path_segments: Vec<Vec<&str>> = parsed
        .iter()
        .map(|url| url.path().split('/').filter(|s| !s.is_empty()).collect())
        .collect();
    let min_length = path_segments
        .iter()
        .filter(|segments| !segments.is_empty())
        .map(|segments| segments.len())
        .min()
        .unwrap_or(0);
    let mut common: Vec<&str> = Vec::new();
    for index in 0..min_length {
        let candidate = match path_segments[0].get(index) {
            Some(candidate) => *candidate,
            None => break,
        };
        if path_segments
            .iter()
            .all(|segments| segments.get(index) == Some(&candidate))
        {
            common.push(candidate);
        } else {
            break;
        }
    }

    match (host.is_empty(), common.is_empty()) {
        (true, true) => String::new(),
        (false, true) => host,
        (true, false) => common.join("/"),
        (false, false) => format!("{}/{}", host, common.join("/")),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> TfIdfScorer {
        TfIdfScorer::from_config(&GraphConfig::default())
    }

    #[test]
    fn distinctive_terms_outrank_common_ones() {
        let docs = [
            "rust compiler tutorial for the borrow checker",
            "rust compiler internals and the borrow checker",
            "gardening tips for the spring season",
        ];
        let terms = scorer().top_terms(&docs, 3);
        assert!(!terms.is_empty());
        assert!(terms.iter().any(|t| t == "rust" || t == "compiler" || t == "borrow"));
    }

    #[test]
    fn stop_words_filtered_in_english_text() {
        let docs = ["the the the parser parser grammar"];
        let terms = scorer().top_terms(&docs, 5);
        assert!(!terms.contains(&"the".to_string()));
        assert!(terms.contains(&"parser".to_string()));
    }

    #[test]
    fn empty_documents_yield_nothing() {
        assert!(scorer().top_terms(&[], 3).is_empty());
        assert!(scorer().top_terms(&["", "  "], 3).is_empty());
    }

    #[test]
    fn results_are_deterministic() {
        let docs = ["alpha beta gamma", "beta gamma delta", "gamma delta epsilon"];
        assert_eq!(scorer().top_terms(&docs, 3), scorer().top_terms(&docs, 3));
    }

    #[test]
    fn detects_japanese_and_english() {
        assert_eq!(detect_language(&["これは日本語の文章です。クラスタの説明。"]), "ja");
        assert_eq!(detect_language(&["plain english words only here"]), "en");
        assert_eq!(detect_language(&["12345 67890"]), "");
        assert_eq!(detect_language(&[""]), "");
    }

    #[test]
    fn url_prefix_label_with_shared_host_and_path() {
        let urls = [
            "https://example.com/docs/guide/intro",
            "https://example.com/docs/guide/advanced",
        ];
        assert_eq!(common_url_prefix_label(&urls), "example.com/docs/guide");
    }

    #[test]
    fn url_prefix_label_host_only_when_paths_diverge() {
        let urls = [
            "https://example.com/docs/intro",
            "https://example.com/blog/post",
        ];
        assert_eq!(common_url_prefix_label(&urls), "example.com");
    }

    #[test]
    fn url_prefix_label_empty_without_http_pages() {
        assert_eq!(common_url_prefix_label(&["file:///tmp/a.html"]), "");
        assert_eq!(common_url_prefix_label(&[]), "");
    }
}
