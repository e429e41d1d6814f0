use std::sync::LazyLock;

use regex::Regex;

use super::{non_empty, or_placeholder};
use crate::{ExtractedFields, Extractor, ItemContent};

/// UK FSA alerts put the distribution summary in the first `<h5>`.
pub struct FsaExtractor;

static H5_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h5>(.*?)</h5>").expect("valid regex"));

impl Extractor for FsaExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        ExtractedFields {
            distribution: or_placeholder(
                H5_RE.captures(&content.raw).and_then(|caps| non_empty(&caps[1])),
            ),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "uk-fsa"
    }
}
