use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::{hyperlink, non_empty, or_placeholder};
use crate::{ExtractedFields, Extractor, ItemContent};

/// NZ MPI: reason from the `<h5><p>` subtitle, distribution from the table
/// cell following "Distribution". Links inside the cell are kept as
/// hyperlink markers.
pub struct MpiExtractor;

static SUBTITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h5><p>(.*?)</p></h5>").expect("valid regex"));

static DISTRIBUTION_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)Distribution.*?</td>\s*<td[^>]*>\s*(.*?)\s*</td>.*?",
        r"(?:Notes|Point of sale notice for retailers|Consumer advice|Point of sale notices for retailers|Point of sale notice)",
    ))
    .expect("valid regex")
});

const REASON_KEYWORD: &str = "due to";

impl Extractor for MpiExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        let recall_reason = SUBTITLE_RE
            .captures(&content.raw)
            .and_then(|caps| non_empty(&caps[1]))
            .map(|reason| match reason.find(REASON_KEYWORD) {
                Some(idx) => reason[idx..].trim().to_string(),
                None => reason,
            });

        let distribution = DISTRIBUTION_CELL_RE
            .captures(&content.raw)
            .and_then(|caps| cell_text(&caps[1]));

        ExtractedFields {
            distribution: or_placeholder(distribution),
            recall_reason: or_placeholder(recall_reason),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "nz-mpi"
    }
}

/// Flatten a cell's HTML to trimmed, non-empty lines, one per text node.
fn cell_text(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let mut parts = Vec::new();
    collect_parts(fragment.root_element(), &mut parts);

    let lines: Vec<&str> = parts
        .iter()
        .flat_map(|p| p.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn collect_parts(element: ElementRef<'_>, parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let text: &str = text;
            parts.push(text.to_string());
            continue;
        }

        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };

        if child_el.value().name() == "a" {
            let href = child_el.value().attr("href").unwrap_or_default();
            let text = child_el.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() && !href.is_empty() {
                parts.push(hyperlink(text, href));
                continue;
            }
        }

        collect_parts(child_el, parts);
    }
}
