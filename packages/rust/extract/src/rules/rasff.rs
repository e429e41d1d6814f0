use std::sync::LazyLock;

use regex::Regex;

use super::non_empty;
use crate::{ExtractedFields, Extractor, ItemContent};

/// RASFF notifications carry the real title under a "Subject" heading.
pub struct RasffExtractor;

static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<h3>\s*Subject\s*</h3>\s*<p>\s*<span>\s*(.*?)\s*</span>").expect("valid regex")
});

impl Extractor for RasffExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        ExtractedFields {
            title: SUBJECT_RE
                .captures(&content.raw)
                .and_then(|caps| non_empty(&caps[1])),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "rasff"
    }
}
