//! Per-source field extraction for recall notices.
//!
//! This crate provides:
//! - [`text`]: HTML → Markdown normalization shared by every rule
//! - [`sources`]: publisher name → [`SourceTag`] standardization
//! - [`rules`]: the built-in per-source extractors
//! - [`ExtractorRegistry`]: table lookup from source tag to extractor

pub mod rules;
pub mod sources;
pub mod text;

use std::collections::HashMap;

use recallbrief_shared::SourceTag;

pub use sources::standardize_source;
pub use text::{ItemContent, collapse_whitespace, to_markdown};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Fields a rule managed to pull out of one item. `None` means "no opinion".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub distribution: Option<String>,
    pub recall_reason: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.distribution.is_none() && self.recall_reason.is_none()
    }
}

/// A pure `content -> fields` rule for one publisher.
pub trait Extractor: Send + Sync {
    fn extract(&self, content: &ItemContent) -> ExtractedFields;

    /// Rule name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Extractors keyed by source tag. Tags without an entry get no extraction.
pub struct ExtractorRegistry {
    extractors: HashMap<SourceTag, Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Registry with no rules.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with all built-in rules.
    pub fn new() -> Self {
        use rules::*;

        let mut registry = Self::empty();
        registry.register(SourceTag::Rasff, RasffExtractor);
        registry.register(SourceTag::UsFda, FdaExtractor);
        registry.register(SourceTag::Canada, CanadaExtractor);
        registry.register(SourceTag::Fsanz, AvailableForSaleExtractor::new("fsanz"));
        registry.register(SourceTag::NswFoodAuthority, AvailableForSaleExtractor::new("nsw"));
        registry.register(SourceTag::NzMpi, MpiExtractor);
        registry.register(SourceTag::UkFsa, FsaExtractor);
        registry.register(SourceTag::RappelConso, RappelConsoExtractor);
        registry.register(SourceTag::JapanCaa, JapanExtractor);
        registry.register(SourceTag::Efsa, SuppressDistribution::new("efsa"));
        registry.register(SourceTag::Who, SuppressDistribution::new("who"));
        registry
    }

    pub fn register(&mut self, tag: SourceTag, extractor: impl Extractor + 'static) {
        self.extractors.insert(tag, Box::new(extractor));
    }

    pub fn get(&self, tag: &SourceTag) -> Option<&dyn Extractor> {
        self.extractors.get(tag).map(|e| e.as_ref())
    }

    /// Run the rule for `tag`, if one is registered.
    pub fn extract(&self, tag: &SourceTag, content: &ItemContent) -> Option<ExtractedFields> {
        let extractor = self.get(tag)?;
        let fields = extractor.extract(content);
        tracing::debug!(rule = extractor.name(), empty = fields.is_empty(), "extracted fields");
        Some(fields)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
