use std::sync::LazyLock;

use regex::Regex;

use super::{non_empty, or_placeholder};
use crate::{ExtractedFields, Extractor, ItemContent};

/// FSANZ and NSW Food Authority notices share one layout: a "Problem:" /
/// "Food safety hazard:" pair for the reason and "available for sale"
/// sentences ahead of "Date Marking" for distribution.
pub struct AvailableForSaleExtractor {
    name: &'static str,
}

impl AvailableForSaleExtractor {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

static PROBLEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:\*\*)?Problem:\s*(.*?)\s*(?:\*\*)?Food safety hazard:").expect("valid regex")
});

static DATE_MARKING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Date Marking").expect("valid regex"));

static PRODUCTS_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)The product\(s\) have been|The products have been").expect("valid regex")
});

const SALE_KEYWORD: &str = "available for sale";

impl Extractor for AvailableForSaleExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        let recall_reason = PROBLEM_RE
            .captures(&content.markdown)
            .and_then(|caps| non_empty(&caps[1].replace('*', "")));

        ExtractedFields {
            distribution: or_placeholder(sale_sentences(&content.markdown)),
            recall_reason: or_placeholder(recall_reason),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Sentences mentioning availability, cut to start at "The products have been"
/// when something precedes it.
fn sale_sentences(markdown: &str) -> Option<String> {
    let before = DATE_MARKING_RE.splitn(markdown, 2).next().unwrap_or_default();

    let joined = before
        .split('.')
        .filter(|s| s.to_lowercase().contains(SALE_KEYWORD))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{s}."))
        .collect::<Vec<_>>()
        .join(" ");

    if joined.is_empty() {
        return None;
    }

    match PRODUCTS_LEAD_RE.find(&joined) {
        Some(m) if !joined[..m.start()].trim().is_empty() => Some(joined[m.start()..].to_string()),
        _ => Some(joined),
    }
}
