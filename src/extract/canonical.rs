use std::path::{Component, Path};
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static CANONICAL_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("link[rel]").unwrap());
static OG_URL_META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:url"]"#).unwrap());
static TWITTER_URL_META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="twitter:url"]"#).unwrap());

/// Extensions that disqualify a path segment from being an archive hostname.
const PAGE_EXTENSIONS: &[&str] = &[".html", ".htm", ".php", ".asp", ".aspx", ".jsp"];

/// Strip the fragment from a URL-ish string.
pub fn sanitize_url(url: &str) -> String {
    url.split('#').next().unwrap_or_default().to_string()
}

/// Best-effort canonical URL for an archived page: the recorded URL when it
/// is already absolute http(s), else `<link rel=canonical>`/social metadata
/// from the HTML, else a URL rebuilt from the archive layout, else the
/// page's file URI.
pub fn infer_canonical_url(document: &Html, url: &str, file_path: &Path) -> String {
    let sanitized = sanitize_url(url);
    if sanitized.starts_with("http://") || sanitized.starts_with("https://") {
        return sanitized;
    }
    let host = extract_host_from_path(file_path);
    let html_url = canonical_url_from_html(document, &host);
    if !html_url.is_empty() {
        return html_url;
    }
    let path_url = build_url_from_archive_path(file_path, &host);
    if !path_url.is_empty() {
        return path_url;
    }
    if !sanitized.is_empty() {
        sanitized
    } else {
        file_uri(file_path)
    }
}

pub fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}

/// The backed-up hostname hiding in an archive path: the last dotted segment
/// that is not a page file, searched after `site_backup` when present.
fn extract_host_from_path(file_path: &Path) -> String {
    let parts: Vec<String> = normal_components(file_path);
    let start = parts
        .iter()
        .position(|part| part == "site_backup")
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let mut host = String::new();
    for segment in &parts[start.min(parts.len())..] {
        let lowered = segment.to_lowercase();
        if segment.contains('.') && !PAGE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
            host = segment.clone();
        }
    }
    host
}

fn canonical_url_from_html(document: &Html, host: &str) -> String {
    let href = canonical_link_href(document)
        .or_else(|| meta_url(document))
        .unwrap_or_default();
    let sanitized = sanitize_url(href.trim());
    if sanitized.is_empty() {
        return String::new();
    }
    if sanitized.starts_with("http://") || sanitized.starts_with("https://") {
        return sanitized;
    }
    if host.is_empty() {
        return sanitized;
    }
    if sanitized.starts_with('/') {
        format!("https://{}{}", host, sanitized)
    } else {
        format!("https://{}/{}", host, sanitized.trim_start_matches('/'))
    }
}

fn canonical_link_href(document: &Html) -> Option<String> {
    for link in document.select(&CANONICAL_LINK) {
        let rel = link.value().attr("rel").unwrap_or_default();
        if rel
            .split_whitespace()
            .any(|value| value.eq_ignore_ascii_case("canonical"))
        {
            if let Some(href) = link.value().attr("href") {
                if !href.trim().is_empty() {
                    return Some(href.to_string());
                }
            }
        }
    }
    None
}

fn meta_url(document: &Html) -> Option<String> {
    document
        .select(&OG_URL_META)
        .chain(document.select(&TWITTER_URL_META))
        .filter_map(|meta| meta.value().attr("content"))
        .map(|content| content.to_string())
        .find(|content| !content.trim().is_empty())
}

fn build_url_from_archive_path(file_path: &Path, host: &str) -> String {
    if host.is_empty() {
        return String::new();
    }
    let parts = normal_components(file_path);
    let host_index = match parts.iter().rposition(|segment| segment == host) {
        Some(idx) => idx,
        None => return String::new(),
    };
    let path = parts[host_index + 1..].join("/");
    if path.is_empty() {
        format!("https://{}/", host)
    } else {
        sanitize_url(&format!("https://{}/{}", host, path.trim_start_matches('/')))
    }
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn absolute_http_url_wins() {
        let url = infer_canonical_url(
            &doc("<html></html>"),
            "https://example.com/page#section",
            &PathBuf::from("/a/site_backup/example.com/page.html"),
        );
        assert_eq!(url, "https://example.com/page");
    }

    #[test]
    fn canonical_link_used_when_url_missing() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical"></head></html>"#;
        let url = infer_canonical_url(
            &doc(html),
            "",
            &PathBuf::from("/a/site_backup/example.com/x.html"),
        );
        assert_eq!(url, "https://example.com/canonical");
    }

    #[test]
    fn relative_canonical_joined_with_archive_host() {
        let html = r#"<html><head><link rel="canonical" href="/docs/page"></head></html>"#;
        let url = infer_canonical_url(
            &doc(html),
            "",
            &PathBuf::from("/a/site_backup/example.com/docs/page.html"),
        );
        assert_eq!(url, "https://example.com/docs/page");
    }

    #[test]
    fn og_url_meta_used_as_fallback() {
        let html = r#"<html><head><meta property="og:url" content="https://example.com/og"></head></html>"#;
        let url = infer_canonical_url(
            &doc(html),
            "",
            &PathBuf::from("/a/site_backup/example.com/x.html"),
        );
        assert_eq!(url, "https://example.com/og");
    }

    #[test]
    fn archive_path_rebuilt_when_html_says_nothing() {
        let url = infer_canonical_url(
            &doc("<html></html>"),
            "",
            &PathBuf::from("/a/site_backup/example.com/docs/guide/intro.html"),
        );
        assert_eq!(url, "https://example.com/docs/guide/intro.html");
    }

    #[test]
    fn file_uri_is_last_resort() {
        let url = infer_canonical_url(&doc("<html></html>"), "", &PathBuf::from("/tmp/loose.html"));
        assert_eq!(url, "file:///tmp/loose.html");
    }

    #[test]
    fn host_detection_prefers_last_dotted_segment() {
        let parts = PathBuf::from("/backups/v2.1/site_backup/blog.example.com/post.html");
        assert_eq!(extract_host_from_path(&parts), "blog.example.com");
    }
}
