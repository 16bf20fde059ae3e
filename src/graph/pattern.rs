use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static NON_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9{}-]+").unwrap());

/// Reduce an absolute URL to a structural pattern of its first `depth` path
/// segments, with volatile segments (UUIDs, numeric ids) replaced by
/// placeholders. Returns an empty string for non-http(s) or pathless URLs.
pub fn extract_url_pattern(url: &str, depth: usize) -> String {
    if url.is_empty() || depth == 0 {
        return String::new();
    }
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return String::new(),
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return String::new();
    }
    let normalized: Vec<String> = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(normalize_url_segment)
        .filter(|segment| !segment.is_empty())
        .collect();
    if normalized.is_empty() {
        return String::new();
    }
    let actual_depth = depth.min(normalized.len()).max(1);
    let pattern = normalized[..actual_depth].join("/");
    match parsed.host_str() {
        Some(host) if !host.is_empty() => format!("{}/{}", host, pattern),
        _ => pattern,
    }
}

fn normalize_url_segment(segment: &str) -> String {
    let mut cleaned = segment.trim().to_lowercase();
    if cleaned.is_empty() {
        return cleaned;
    }
    if let Some(stem) = cleaned.split('.').next() {
        cleaned = stem.to_string();
    }
    if UUID_RE.is_match(&cleaned) {
        return "{uuid}".to_string();
    }
    let digit_count = cleaned.chars().filter(|c| c.is_ascii_digit()).count();
    let total = cleaned.chars().count();
    if digit_count > 0 && digit_count == total {
        return "{num}".to_string();
    }
    if digit_count >= 3 && (digit_count as f64) / (total.max(1) as f64) >= 0.5 {
        cleaned = DIGIT_RUN_RE.replace_all(&cleaned, "{num}").to_string();
    }
    let cleaned = NON_SLUG_RE.replace_all(&cleaned, "-").to_string();
    cleaned.trim_matches('-').to_string()
}

/// Derive a grouping key from an archive file path: the backed-up host (from
/// a `site_backup/<host>/...` layout, else the first dotted segment) plus up
/// to `depth` directory segments below it. Depth 0 keys on the host alone.
pub fn directory_key(path: &Path, depth: usize) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let mut host = String::new();
    let mut host_index: Option<usize> = None;
    if let Some(idx) = parts.iter().position(|part| part == "site_backup") {
        if idx + 1 < parts.len() {
            host = parts[idx + 1].clone();
            host_index = Some(idx + 1);
        }
    }
    if host_index.is_none() {
        for (idx, segment) in parts.iter().enumerate() {
            let lowered = segment.to_lowercase();
            if segment.contains('.') && !lowered.ends_with(".html") && !lowered.ends_with(".htm") {
                host = segment.clone();
                host_index = Some(idx);
                break;
            }
        }
    }

    let rel_parts: &[String] = match host_index {
        Some(idx) => &parts[idx + 1..],
        None => &parts[..],
    };
    let mut segments: Vec<String> = Vec::new();
    for segment in rel_parts {
        let lowered = segment.to_lowercase();
        if lowered.ends_with(".html") || lowered.ends_with(".htm") {
            break;
        }
        segments.push(segment.clone());
        if depth > 0 && segments.len() >= depth {
            break;
        }
    }
    if depth > 0 && segments.is_empty() && !rel_parts.is_empty() {
        segments.push(rel_parts[0].clone());
    }

    let key_segments: Vec<String> = if depth == 0 {
        if host.is_empty() {
            vec!["root".to_string()]
        } else {
            vec![host]
        }
    } else if host.is_empty() {
        segments
    } else {
        std::iter::once(host).chain(segments).collect()
    };

    if key_segments.is_empty() {
        path.parent()
            .map(|parent| parent.display().to_string())
            .unwrap_or_default()
    } else {
        key_segments.join("/")
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pattern_truncates_to_depth() {
        let pattern = extract_url_pattern("https://example.com/docs/guide/intro", 2);
        assert_eq!(pattern, "example.com/docs/guide");
    }

    #[test]
    fn pattern_replaces_numeric_segments() {
        let pattern = extract_url_pattern("https://example.com/docs/guide/2024/intro", 3);
        assert_eq!(pattern, "example.com/docs/guide/{num}");
    }

    #[test]
    fn pattern_replaces_uuid_segments() {
        let pattern = extract_url_pattern(
            "https://example.com/item/123e4567-e89b-12d3-a456-426614174000",
            2,
        );
        assert_eq!(pattern, "example.com/item/{uuid}");
    }

    #[test]
    fn pattern_collapses_dense_digit_runs() {
        // "ab1234cd" is 50% digits with a run of 4
        let pattern = extract_url_pattern("https://example.com/ab1234cd", 1);
        assert_eq!(pattern, "example.com/ab{num}cd");
    }

    #[test]
    fn pattern_rejects_non_http_schemes() {
        assert_eq!(extract_url_pattern("file:///tmp/page.html", 2), "");
        assert_eq!(extract_url_pattern("", 2), "");
    }

    #[test]
    fn pattern_strips_file_extension() {
        let pattern = extract_url_pattern("https://example.com/docs/intro.html", 2);
        assert_eq!(pattern, "example.com/docs/intro");
    }

    #[test]
    fn pattern_depth_monotonicity() {
        // Deeper patterns refine coarser ones: equal 3-segment patterns imply
        // equal 2-segment patterns.
        let a = "https://example.com/docs/guide/2024/intro";
        let b = "https://example.com/docs/guide/2023/overview";
        assert_eq!(extract_url_pattern(a, 3), extract_url_pattern(b, 3));
        assert_eq!(extract_url_pattern(a, 2), extract_url_pattern(b, 2));
    }

    #[test]
    fn directory_key_detects_site_backup_layout() {
        let path = PathBuf::from("/data/site_backup/example.com/docs/guide/intro.html");
        assert_eq!(directory_key(&path, 2), "example.com/docs/guide");
        assert_eq!(directory_key(&path, 1), "example.com/docs");
        assert_eq!(directory_key(&path, 0), "example.com");
    }

    #[test]
    fn directory_key_falls_back_to_dotted_segment() {
        let path = PathBuf::from("/archive/blog.example.com/posts/001.html");
        assert_eq!(directory_key(&path, 2), "blog.example.com/posts");
        assert_eq!(directory_key(&path, 0), "blog.example.com");
    }

    #[test]
    fn directory_key_without_host_uses_root_marker_at_depth_zero() {
        let path = PathBuf::from("/pages/docs/intro.html");
        assert_eq!(directory_key(&path, 0), "root");
        assert_eq!(directory_key(&path, 2), "pages/docs");
    }

    #[test]
    fn directory_key_file_directly_under_host() {
        let path = PathBuf::from("/data/site_backup/example.com/index.html");
        // No directory below the host: the file name itself becomes the key tail.
        assert_eq!(directory_key(&path, 2), "example.com/index.html");
    }
}
