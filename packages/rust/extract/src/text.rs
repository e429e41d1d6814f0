//! HTML → text normalization.
//!
//! Rules see each item three ways: the raw HTML, a Markdown rendering that
//! keeps line structure, and a single-line flattened form.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// One item's body, pre-normalized for extraction rules.
#[derive(Debug, Clone, Default)]
pub struct ItemContent {
    pub raw: String,
    pub markdown: String,
    /// Markdown with every whitespace run collapsed to one space.
    pub flat: String,
}

impl ItemContent {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let markdown = to_markdown(&raw);
        let flat = collapse_whitespace(&markdown);
        Self {
            raw,
            markdown,
            flat,
        }
    }
}

/// Convert HTML to Markdown. Falls back to tag-stripped text if `htmd` fails.
pub fn to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript", "svg", "img"])
        .build();

    match converter.convert(html) {
        Ok(md) => clean_blank_lines(&md).trim().to_string(),
        Err(e) => {
            debug!(error = %e, "htmd conversion failed, stripping tags");
            strip_tags(html).trim().to_string()
        }
    }
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

fn strip_tags(html: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    TAG_RE.replace_all(html, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_keeps_structure() {
        let md = to_markdown("<p><strong>Problem:</strong> undeclared milk</p><p>Second</p>");
        assert!(md.contains("**Problem:**"));
        assert!(md.contains("undeclared milk"));
        assert!(md.contains('\n'));
    }

    #[test]
    fn flat_form_is_single_line() {
        let content = ItemContent::new("<p>one\n\n  two</p>\n<p>three</p>");
        assert!(!content.flat.contains('\n'));
        assert!(content.flat.contains("one two"));
        assert!(content.flat.ends_with("three"));
    }

    #[test]
    fn empty_input_is_empty() {
        let content = ItemContent::new("   ");
        assert!(content.markdown.is_empty());
        assert!(content.flat.is_empty());
    }

    #[test]
    fn collapse_whitespace_trims() {
        assert_eq!(collapse_whitespace("  a \t b\n\nc  "), "a b c");
    }

    #[test]
    fn strip_tags_fallback() {
        assert_eq!(strip_tags("<p>a <b>b</b></p>"), "a b");
    }
}
