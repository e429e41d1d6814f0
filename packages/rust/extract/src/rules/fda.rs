use std::sync::LazyLock;

use regex::Regex;

use super::non_empty;
use crate::{ExtractedFields, Extractor, ItemContent};

/// US FDA: recall reason between "Recall Reason Description" and "Company Name:".
pub struct FdaExtractor;

static REASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Recall Reason Description\s*(.*?)\s*Company Name:").expect("valid regex")
});

impl Extractor for FdaExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        let recall_reason = REASON_RE
            .captures(&content.flat)
            .and_then(|caps| non_empty(caps[1].trim_matches(|c: char| c == '*' || c.is_whitespace())));

        ExtractedFields {
            recall_reason,
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "us-fda"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_reason() {
        let html = "<div>Recall Reason Description</div><div>Potential Listeria\n monocytogenes contamination</div><div>Company Name: Acme Foods</div>";
        let fields = FdaExtractor.extract(&ItemContent::new(html));
        assert_eq!(
            fields.recall_reason.as_deref(),
            Some("Potential Listeria monocytogenes contamination")
        );
    }

    #[test]
    fn bold_label_is_trimmed() {
        let html = "<p><strong>Recall Reason Description</strong></p><p>Undeclared peanuts</p><p>Company Name: X</p>";
        let fields = FdaExtractor.extract(&ItemContent::new(html));
        assert_eq!(fields.recall_reason.as_deref(), Some("Undeclared peanuts"));
    }

    #[test]
    fn missing_block_keeps_earlier_value() {
        let fields = FdaExtractor.extract(&ItemContent::new("<p>Company Name: X</p>"));
        assert!(fields.is_empty());
    }
}
