use std::sync::LazyLock;

use regex::Regex;

use super::{clean_markdown_line, or_placeholder};
use crate::{ExtractedFields, Extractor, ItemContent};

/// Government of Canada: the block between "Distribution" and "Affected".
pub struct CanadaExtractor;

static DISTRIBUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Distribution\s*(.*?)\s*Affected").expect("valid regex"));

impl Extractor for CanadaExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        let distribution = DISTRIBUTION_RE.captures(&content.markdown).and_then(|caps| {
            let lines: Vec<&str> = caps[1]
                .lines()
                .map(clean_markdown_line)
                .filter(|l| !l.is_empty())
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        });

        ExtractedFields {
            distribution: or_placeholder(distribution),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "canada"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_distribution_lines() {
        let html = "<h2>Distribution</h2><p>Ontario</p><p>Quebec</p><h2>Affected products</h2>";
        let fields = CanadaExtractor.extract(&ItemContent::new(html));
        assert_eq!(fields.distribution.as_deref(), Some("Ontario\nQuebec"));
    }

    #[test]
    fn missing_section_resets_distribution() {
        let fields = CanadaExtractor.extract(&ItemContent::new("<p>Affected products</p>"));
        assert_eq!(fields.distribution.as_deref(), Some("--"));
        assert!(fields.recall_reason.is_none());
    }
}
