use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{hyperlink, or_placeholder};
use crate::{ExtractedFields, Extractor, ItemContent};

/// Japan Consumer Affairs Agency: labelled "販売…：" lines for distribution,
/// the "回収理由の詳細：" block for the reason.
pub struct JapanExtractor;

const PRIMARY_MARKERS: &[&str] = &[
    "販売地域、販売先",
    "販売チャネル",
    "販売店舗",
    "販売場所",
    "販売地域",
    "販売先",
    "販売店",
    "場所",
    "を販売している地区や地域",
];

/// Only consulted when no primary marker matched anywhere.
const FALLBACK_MARKERS: &[&str] = &["その他"];

const REASON_MARKER: &str = "回収理由の詳細：";
const SEE_REFERENCE: &str = "参照情報をご確認ください。";
const REFERENCE_LINK_TEXT: &str = "参照情報";

static PRIMARY_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| marker_regexes(PRIMARY_MARKERS));
static FALLBACK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| marker_regexes(FALLBACK_MARKERS));

fn marker_regexes(markers: &[&str]) -> Vec<Regex> {
    markers
        .iter()
        .map(|m| Regex::new(&format!(r"{}\s*：", regex::escape(m))).expect("valid regex"))
        .collect()
}

impl Extractor for JapanExtractor {
    fn extract(&self, content: &ItemContent) -> ExtractedFields {
        let distribution = distribution_from_markdown(&content.markdown).map(|d| {
            if d.contains(SEE_REFERENCE) {
                match reference_href(&content.raw) {
                    Some(href) => d.replace(SEE_REFERENCE, &hyperlink(REFERENCE_LINK_TEXT, &href)),
                    None => d,
                }
            } else {
                d
            }
        });

        ExtractedFields {
            distribution: or_placeholder(distribution),
            recall_reason: or_placeholder(reason_from_markdown(&content.markdown)),
            ..Default::default()
        }
    }

    fn name(&self) -> &str {
        "japan-caa"
    }
}

fn distribution_from_markdown(markdown: &str) -> Option<String> {
    let lines: Vec<&str> = markdown.lines().collect();

    let mut found = collect_marked(&lines, &PRIMARY_RES);
    if found.is_empty() {
        found = collect_marked(&lines, &FALLBACK_RES);
    }
    if found.is_empty() {
        return None;
    }

    let mut unique: Vec<String> = Vec::with_capacity(found.len());
    for entry in found {
        if !unique.contains(&entry) {
            unique.push(entry);
        }
    }

    if let Some(pos) = unique
        .iter()
        .position(|d| d.contains("全國") || d.contains("全国"))
    {
        unique.remove(pos);
        unique.insert(0, "全国".to_string());
    }

    Some(unique.join("\n"))
}

/// Text after the first matching marker on each line, plus any indented
/// continuation lines that follow it.
fn collect_marked(lines: &[&str], markers: &[Regex]) -> Vec<String> {
    let mut found = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        let Some(m) = markers.iter().find_map(|re| re.find(stripped)) else {
            continue;
        };

        let rest = stripped[m.end()..].trim();
        if !rest.is_empty() {
            found.push(rest.to_string());
        }

        for next in &lines[i + 1..] {
            if !(next.starts_with('\u{3000}') || next.starts_with(' ')) {
                break;
            }
            let extended = next.trim();
            if !extended.is_empty() {
                found.push(extended.to_string());
            }
        }
    }

    found
}

fn reason_from_markdown(markdown: &str) -> Option<String> {
    let mut found = Vec::new();
    let mut collecting = false;

    for line in markdown.lines() {
        let stripped = line.trim();
        if let Some((_, rest)) = stripped.split_once(REASON_MARKER) {
            collecting = true;
            if !rest.trim().is_empty() {
                found.push(rest.trim().to_string());
            }
            continue;
        }

        if collecting {
            if stripped.is_empty() {
                break;
            }
            found.push(stripped.to_string());
        }
    }

    (!found.is_empty()).then(|| found.join("\n"))
}

fn reference_href(html: &str) -> Option<String> {
    static LINK_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

    let doc = Html::parse_fragment(html);
    doc.select(&LINK_SEL)
        .find(|a| a.text().collect::<String>().trim() == REFERENCE_LINK_TEXT)
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}
