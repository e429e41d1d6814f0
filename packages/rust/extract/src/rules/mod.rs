//! Built-in per-source extraction rules.

use recallbrief_shared::DEFAULT_PLACEHOLDER;

mod canada;
mod fda;
mod fsa;
mod japan;
mod mpi;
mod oceania;
mod rappel_conso;
mod rasff;
mod suppress;

pub use canada::CanadaExtractor;
pub use fda::FdaExtractor;
pub use fsa::FsaExtractor;
pub use japan::JapanExtractor;
pub use mpi::MpiExtractor;
pub use oceania::AvailableForSaleExtractor;
pub use rappel_conso::RappelConsoExtractor;
pub use rasff::RasffExtractor;
pub use suppress::SuppressDistribution;

/// Marker-encoded hyperlink understood by the report renderer.
pub fn hyperlink(text: &str, href: &str) -> String {
    format!("§HYPERLINK§{text}§{href}§")
}

/// A field the rule owns but could not find resolves to the placeholder.
fn or_placeholder(value: Option<String>) -> Option<String> {
    Some(value.unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string()))
}

/// Trim and drop empty results.
fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Strip Markdown decoration (emphasis, heading hashes, rule/bullet dashes) from one line.
fn clean_markdown_line(line: &str) -> &str {
    line.trim_matches(|c: char| matches!(c, '*' | '#' | '-' | '=') || c.is_whitespace())
}
