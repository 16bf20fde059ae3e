use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::config::RenderConfig;
use crate::extract::canonical;

const BROWSER_UNAVAILABLE: &str = "browser_unavailable";
const RENDER_TIMEOUT: &str = "render_timeout";
const RETRY_PAUSE_MS: u64 = 200;

/// Click-open collapsed widgets: aria state, accordion/read-more classes,
/// and <details> elements.
const AUTO_EXPAND_HEURISTICS: &str = r#"
(() => {
    const clicked = new Set();
    const tryClick = (el) => {
        if (!el || clicked.has(el)) {
            return;
        }
        const style = window.getComputedStyle(el);
        if (style && (style.visibility === 'hidden' || style.display === 'none')) {
            return;
        }
        if (typeof el.click === 'function') {
            el.click();
            clicked.add(el);
        }
    };
    const selectors = [
        '[aria-expanded="false"]',
        '[data-expand]',
        '[data-toggle]',
        '[data-accordion]',
        '[data-collapsible]',
        '.accordion',
        '.accordion-item',
        '.accordion-button',
        '.collapse',
        '.expand',
        '.expander',
        '.faq-item',
        '.read-more',
        '.show-more',
    ];
    selectors.forEach((selector) => {
        document.querySelectorAll(selector).forEach((el) => {
            const button = el.matches('button, [role="button"], a')
                ? el
                : el.querySelector('button, [role="button"], a');
            if (button) {
                tryClick(button);
            }
        });
    });
    document.querySelectorAll('[aria-controls]').forEach((el) => tryClick(el));
    document.querySelectorAll('details:not([open])').forEach((detail) => {
        detail.setAttribute('open', '');
    });
    return clicked.size;
})()
"#;

/// Click elements whose label contains any of the configured expand texts.
/// `TEXTS` is substituted with a JSON array before evaluation.
const AUTO_EXPAND_BY_TEXT: &str = r#"
(() => {
    const lowered = TEXTS.map((text) => text.toLowerCase());
    if (!lowered.length) {
        return 0;
    }
    let count = 0;
    const elements = Array.from(document.querySelectorAll('button, [role="button"], a'));
    for (const element of elements) {
        const label = (element.innerText || element.getAttribute('aria-label') || '').toLowerCase();
        if (!label) {
            continue;
        }
        if (lowered.some((text) => label.includes(text))) {
            element.click();
            count += 1;
        }
    }
    return count;
})()
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Browser,
    Plain,
}

/// One rendered archive page, ready for extraction.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub source_path: PathBuf,
    pub final_html: String,
    pub final_url: String,
    pub mode: RenderMode,
    pub fallback_reason: Option<String>,
}

/// Render local HTML files in a shared headless browser, preserving input
/// order. Pages stream back over a channel as workers finish; a browser that
/// cannot launch degrades every page to a plain file read.
pub async fn render_paths(paths: &[PathBuf], config: &RenderConfig) -> Result<Vec<RenderedPage>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = BrowserConfig::builder();
    if let Some(executable) = &config.chrome_executable {
        builder = builder.chrome_executable(executable);
    }
    let browser_config = match builder.build() {
        Ok(browser_config) => browser_config,
        Err(err) => {
            warn!("Browser unavailable ({}), reading local HTML as-is", err);
            return Ok(read_all_plain(paths));
        }
    };
    let (browser, mut handler) = match Browser::launch(browser_config).await {
        Ok(launched) => launched,
        Err(err) => {
            warn!("Browser launch failed ({}), reading local HTML as-is", err);
            return Ok(read_all_plain(paths));
        }
    };
    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    let total = paths.len();
    let workers = worker_count(total, config.max_concurrency);
    info!("Rendering {} pages with {} workers", total, workers);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let browser = Arc::new(browser);
    let shared_config = Arc::new(config.clone());
    let semaphore = Arc::new(Semaphore::new(workers));
    let (tx, mut rx) = mpsc::channel::<(usize, Result<RenderedPage>)>(workers * 2);

    for (index, path) in paths.iter().cloned().enumerate() {
        let browser = Arc::clone(&browser);
        let shared_config = Arc::clone(&shared_config);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            let result = render_with_retries(&browser, &path, &shared_config).await;
            let _ = tx.send((index, result)).await;
        });
    }
    drop(tx);

    let mut results: Vec<Option<RenderedPage>> = (0..total).map(|_| None).collect();
    let mut first_error: Option<anyhow::Error> = None;
    while let Some((index, result)) = rx.recv().await {
        match result {
            Ok(page) => results[index] = Some(page),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if let Ok(mut browser) = Arc::try_unwrap(browser) {
        let _ = browser.close().await;
        let _ = browser.wait().await;
    }
    handler_task.abort();

    if let Some(err) = first_error {
        return Err(err);
    }
    Ok(results.into_iter().flatten().collect())
}

/// Worker pool size: explicit setting wins, else derived from CPU count.
fn worker_count(total: usize, requested: Option<usize>) -> usize {
    if let Some(requested) = requested {
        if requested > 0 {
            return requested.min(total).max(1);
        }
    }
    let cpu_total = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    let baseline = if cpu_total <= 1 {
        1
    } else if cpu_total <= 4 {
        cpu_total - 1
    } else {
        (cpu_total / 2 + 2).min(8)
    };
    baseline.min(total).max(1)
}

async fn render_with_retries(
    browser: &Browser,
    path: &Path,
    config: &RenderConfig,
) -> Result<RenderedPage> {
    let attempts = config.max_render_attempts.max(1);
    let mut timeout = config.render_timeout.max(0.1);
    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(
            Duration::from_secs_f64(timeout),
            render_once(browser, path, config),
        )
        .await;
        match outcome {
            Ok(Ok(page)) => return Ok(page),
            // Non-timeout failures are not worth retrying.
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                if attempt < attempts {
                    warn!(
                        "Render timeout for {} ({:.1}s), retry {}/{}",
                        path.display(),
                        timeout,
                        attempt,
                        attempts
                    );
                    timeout *= config.timeout_backoff_factor.max(1.0);
                    tokio::time::sleep(Duration::from_millis(RETRY_PAUSE_MS)).await;
                    continue;
                }
                if config.allow_plain_fallback {
                    error!(
                        "Rendering failed for {}, falling back to the local HTML",
                        path.display()
                    );
                    return Ok(read_plain(path, RENDER_TIMEOUT));
                }
                bail!(
                    "rendering {} timed out after {} attempts; pass --allow-render-fallback to \
                     continue with the local HTML",
                    path.display(),
                    attempts
                );
            }
        }
    }
    Ok(read_plain(path, "unknown"))
}

async fn render_once(browser: &Browser, path: &Path, config: &RenderConfig) -> Result<RenderedPage> {
    let uri = canonical::file_uri(path);
    let page = browser.new_page(uri.as_str()).await?;
    page.wait_for_navigation().await?;

    for _ in 0..config.max_scroll_iterations {
        page.evaluate("window.scrollBy(0, document.body.scrollHeight)")
            .await?;
        if config.scroll_pause > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(config.scroll_pause)).await;
        }
    }
    if config.auto_expand_candidates {
        page.evaluate(AUTO_EXPAND_HEURISTICS).await?;
    }
    if !config.expand_texts.is_empty() {
        let texts = serde_json::to_string(&config.expand_texts)?;
        page.evaluate(AUTO_EXPAND_BY_TEXT.replace("TEXTS", &texts))
            .await?;
    }
    if config.post_render_delay > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(config.post_render_delay)).await;
    }

    let final_html = page.content().await?;
    let final_url = page.url().await?.unwrap_or_else(|| uri.clone());
    let _ = page.close().await;

    Ok(RenderedPage {
        source_path: path.to_path_buf(),
        final_html,
        final_url,
        mode: RenderMode::Browser,
        fallback_reason: None,
    })
}

fn read_all_plain(paths: &[PathBuf]) -> Vec<RenderedPage> {
    paths
        .iter()
        .map(|path| read_plain(path, BROWSER_UNAVAILABLE))
        .collect()
}

fn read_plain(path: &Path, reason: &str) -> RenderedPage {
    let final_html = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            error!("Failed to read {}: {}", path.display(), err);
            String::new()
        }
    };
    RenderedPage {
        source_path: path.to_path_buf(),
        final_html,
        final_url: canonical::file_uri(path),
        mode: RenderMode::Plain,
        fallback_reason: Some(reason.to_string()),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn empty_input_renders_nothing() {
        let pages = render_paths(&[], &RenderConfig::default()).await.unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn explicit_concurrency_capped_by_total() {
        assert_eq!(worker_count(3, Some(10)), 3);
        assert_eq!(worker_count(10, Some(4)), 4);
        assert!(worker_count(100, None) >= 1);
    }

    #[test]
    fn plain_read_keeps_content_and_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "<html><body>hello</body></html>").unwrap();

        let page = read_plain(&path, BROWSER_UNAVAILABLE);
        assert!(page.final_html.contains("hello"));
        assert_eq!(page.mode, RenderMode::Plain);
        assert_eq!(page.fallback_reason.as_deref(), Some(BROWSER_UNAVAILABLE));
        assert!(page.final_url.starts_with("file://"));
    }

    #[test]
    fn missing_file_reads_empty() {
        let page = read_plain(Path::new("/definitely/not/here.html"), RENDER_TIMEOUT);
        assert!(page.final_html.is_empty());
        assert_eq!(page.mode, RenderMode::Plain);
    }
}
