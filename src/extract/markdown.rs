use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Node};

static EXCESS_BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert a readable DOM fragment into plain Markdown. Structural noise
/// (scripts, navigation, images) is dropped; unknown containers are
/// flattened into their children.
pub fn element_to_markdown(root: ElementRef) -> String {
    let mut out = String::new();
    render_children(root, &mut out);
    let collapsed = EXCESS_BLANKS_RE.replace_all(&out, "\n\n");
    collapsed.trim().to_string()
}

fn render_children(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if !collapsed.trim().is_empty() {
                    out.push_str(&collapsed);
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn render_element(el: ElementRef, out: &mut String) {
    match el.value().name() {
        "script" | "style" | "noscript" | "template" | "head" | "nav" | "iframe" | "svg"
        | "img" => {}
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = el.value().name().as_bytes()[1] - b'0';
            let text = inline_text(el);
            if !text.is_empty() {
                ensure_block_break(out);
                out.push_str(&"#".repeat(level as usize));
                out.push(' ');
                out.push_str(&text);
                ensure_block_break(out);
            }
        }
        "p" => {
            ensure_block_break(out);
            render_children(el, out);
            ensure_block_break(out);
        }
        "br" => out.push('\n'),
        "ul" | "ol" => {
            ensure_block_break(out);
            render_children(el, out);
            ensure_block_break(out);
        }
        "li" => {
            ensure_line_break(out);
            out.push_str("- ");
            let text = inline_text(el);
            out.push_str(&text);
        }
        "a" => {
            let text = inline_text(el);
            match el.value().attr("href") {
                Some(href) if !text.is_empty() && !href.trim().is_empty() => {
                    out.push_str(&format!("[{}]({})", text, href.trim()));
                }
                _ => out.push_str(&text),
            }
        }
        "strong" | "b" => {
            let text = inline_text(el);
            if !text.is_empty() {
                out.push_str(&format!("**{}**", text));
            }
        }
        "em" | "i" => {
            let text = inline_text(el);
            if !text.is_empty() {
                out.push_str(&format!("*{}*", text));
            }
        }
        "pre" => {
            let raw: String = el.text().collect();
            ensure_block_break(out);
            out.push_str("```\n");
            out.push_str(raw.trim_end());
            out.push_str("\n```");
            ensure_block_break(out);
        }
        "code" => {
            let text = inline_text(el);
            if !text.is_empty() {
                out.push_str(&format!("`{}`", text));
            }
        }
        "blockquote" => {
            let mut inner = String::new();
            render_children(el, &mut inner);
            ensure_block_break(out);
            for line in inner.trim().lines() {
                out.push_str("> ");
                out.push_str(line.trim());
                out.push('\n');
            }
            ensure_block_break(out);
        }
        "div" | "section" | "article" | "main" | "header" | "footer" | "aside" | "figure"
        | "table" | "tbody" | "thead" | "tr" | "td" | "th" | "body" | "html" => {
            ensure_line_break(out);
            render_children(el, out);
            ensure_line_break(out);
        }
        _ => render_children(el, out),
    }
}

/// Flattened, whitespace-collapsed text of an element.
pub fn inline_text(el: ElementRef) -> String {
    let joined: String = el.text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined).trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}

fn ensure_block_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if out.is_empty() {
        return;
    }
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

fn ensure_line_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if out.is_empty() || out.ends_with('\n') {
        return;
    }
    out.push('\n');
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn markdown_of(html: &str) -> String {
        let document = Html::parse_document(html);
        element_to_markdown(document.root_element())
    }

    #[test]
    fn headings_and_paragraphs() {
        let md = markdown_of("<h1>Title</h1><p>First para.</p><p>Second para.</p>");
        assert!(md.starts_with("# Title"));
        assert!(md.contains("First para."));
        assert!(md.contains("\n\nSecond para."));
    }

    #[test]
    fn lists_become_dashes() {
        let md = markdown_of("<ul><li>one</li><li>two</li></ul>");
        assert!(md.contains("- one"));
        assert!(md.contains("- two"));
    }

    #[test]
    fn links_keep_href() {
        let md = markdown_of("<p>See <a href=\"https://example.com/x\">docs</a>.</p>");
        assert!(md.contains("[docs](https://example.com/x)"));
    }

    #[test]
    fn scripts_and_styles_dropped() {
        let md = markdown_of("<p>keep</p><script>var x = 1;</script><style>p{}</style>");
        assert_eq!(md, "keep");
    }

    #[test]
    fn preformatted_text_fenced() {
        let md = markdown_of("<pre>let x = 1;\nlet y = 2;</pre>");
        assert!(md.contains("```\nlet x = 1;\nlet y = 2;\n```"));
    }

    #[test]
    fn blockquote_prefixed() {
        let md = markdown_of("<blockquote>quoted words</blockquote>");
        assert!(md.contains("> quoted words"));
    }

    #[test]
    fn whitespace_collapsed() {
        let md = markdown_of("<p>lots    of\n   space</p>");
        assert!(md.contains("lots of space"));
    }
}
