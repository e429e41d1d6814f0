use std::sync::LazyLock;

use regex::Regex;

use super::{non_empty, or_placeholder};
use crate::{ExtractedFields, Extractor, ItemContent};

/// Rappel Conso (France): sales zone + distributors, and the recall motive.
pub struct RappelConsoExtractor;

static DISTRIBUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)Zone géographique de vente(.*?)Distributeurs(.*?)Informations pratiques concernant le rappel",
    )
    .expect("valid regex")
});

static REASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Motif du rappel(.*?)Risques encourus par le consommateur").expect("valid regex")
});

impl Extractor for RappelConsoExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        let distribution = DISTRIBUTION_RE.captures(&content.markdown).map(|caps| {
            format!(
                "{} : {}",
                strip_decoration(&caps[1]),
                strip_decoration(&caps[2])
            )
        });

        let recall_reason = REASON_RE
            .captures(&content.markdown)
            .and_then(|caps| non_empty(strip_decoration(&caps[1])));

        ExtractedFields {
            distribution: or_placeholder(distribution),
            recall_reason: or_placeholder(recall_reason),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "rappel-conso"
    }
}

fn strip_decoration(s: &str) -> &str {
    s.trim_matches(|c: char| matches!(c, '*' | '#') || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FICHE: &str = "<h3>Zone géographique de vente</h3><p>France entière</p>\
        <h3>Distributeurs</h3><p>Carrefour, Leclerc</p>\
        <h3>Motif du rappel</h3><p>Présence de Listeria</p>\
        <h3>Risques encourus par le consommateur</h3><p>Listeriose</p>\
        <h3>Informations pratiques concernant le rappel</h3>";

    #[test]
    fn joins_zone_and_distributors() {
        let fields = RappelConsoExtractor.extract(&ItemContent::new(FICHE));
        let distribution = fields.distribution.unwrap();
        assert!(distribution.starts_with("France entière : "));
        assert!(distribution.contains("Carrefour, Leclerc"));
    }

    #[test]
    fn extracts_motive() {
        let fields = RappelConsoExtractor.extract(&ItemContent::new(FICHE));
        assert_eq!(fields.recall_reason.as_deref(), Some("Présence de Listeria"));
    }

    #[test]
    fn missing_sections_reset_fields() {
        let fields = RappelConsoExtractor.extract(&ItemContent::new("<p>Fiche retirée</p>"));
        assert_eq!(fields.distribution.as_deref(), Some("--"));
        assert_eq!(fields.recall_reason.as_deref(), Some("--"));
    }
}
