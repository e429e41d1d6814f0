use recallbrief_shared::DEFAULT_PLACEHOLDER;

use crate::{ExtractedFields, Extractor, ItemContent};

/// Sources whose distribution is never reported; always resets it to the default.
pub struct SuppressDistribution {
    name: &'static str,
}

impl SuppressDistribution {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Extractor for SuppressDistribution {
    fn extract(&self, _content: &ItemContent) -> ExtractedFields {
        ExtractedFields {
            distribution: Some(DEFAULT_PLACEHOLDER.to_string()),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}
