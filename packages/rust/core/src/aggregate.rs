//! Merge keyed partial results onto the canonical record list.
//!
//! For every canonical key and every field the partials are walked in order;
//! the last applicable hit wins. A partial is applicable when its scope
//! admits the record's source tag. An empty value counts as a miss. A value
//! equal to [`DEFAULT_PLACEHOLDER`] is a hit that resolves to the configured
//! placeholder, so a later source can deliberately blank a field.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use recallbrief_shared::{
    DEFAULT_PLACEHOLDER, Field, GlobalId, Origin, PartialResult, Record, Scope, SourceTag,
};

/// What is known about a record before merging.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub title: String,
    pub url: String,
    pub source: SourceTag,
    pub products: Vec<String>,
}

/// Builds the final, fully-shaped record list.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    placeholder: String,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER)
    }
}

impl ResultAggregator {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
        }
    }

    /// One record per key, in key order. Keys without metadata still get a
    /// record with every field set to the placeholder.
    #[instrument(skip_all, fields(keys = keys.len(), partials = partials.len()))]
    pub fn merge(
        &self,
        keys: &[GlobalId],
        meta: &HashMap<GlobalId, RecordMeta>,
        partials: &[PartialResult],
    ) -> Vec<Record> {
        // Later duplicates overwrite earlier ones.
        let tables: Vec<HashMap<&str, &str>> = partials
            .iter()
            .map(|p| {
                p.entries
                    .iter()
                    .map(|(gid, value)| (gid.as_str(), value.as_str()))
                    .collect()
            })
            .collect();

        keys.iter()
            .enumerate()
            .map(|(i, gid)| {
                let record_meta = meta.get(gid);
                let source = record_meta.map(|m| &m.source);
                let url = record_meta.map(|m| m.url.as_str()).unwrap_or_default();

                let resolve = |field: Field| {
                    self.resolve(field, gid, source, url, partials, &tables)
                };

                let title = resolve(Field::Title)
                    .or_else(|| record_meta.map(|m| m.title.clone()).filter(|t| !t.trim().is_empty()))
                    .unwrap_or_else(|| self.placeholder.clone());

                Record {
                    num: i + 1,
                    title,
                    url: self.or_placeholder(url),
                    source: source
                        .map(|s| self.or_placeholder(s.label()))
                        .unwrap_or_else(|| self.placeholder.clone()),
                    distribution: resolve(Field::Distribution)
                        .unwrap_or_else(|| self.placeholder.clone()),
                    recall_reason: resolve(Field::RecallReason)
                        .unwrap_or_else(|| self.placeholder.clone()),
                    screening: resolve(Field::Screening).unwrap_or_else(|| self.placeholder.clone()),
                    products: record_meta.map(|m| m.products.clone()).unwrap_or_default(),
                    global_id: gid.clone(),
                }
            })
            .collect()
    }

    fn resolve(
        &self,
        field: Field,
        gid: &GlobalId,
        source: Option<&SourceTag>,
        url: &str,
        partials: &[PartialResult],
        tables: &[HashMap<&str, &str>],
    ) -> Option<String> {
        let mut winner = None;

        for (partial, table) in partials.iter().zip(tables) {
            if partial.field != field || !applies(partial, source, url) {
                continue;
            }
            let Some(raw) = table.get(gid.as_str()) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }

            let value = if raw.trim() == DEFAULT_PLACEHOLDER {
                self.placeholder.clone()
            } else {
                post_process(partial.origin, field, source, url, raw)
            };
            debug!(%gid, ?field, origin = ?partial.origin, "field resolved");
            winner = Some(value);
        }

        winner
    }

    fn or_placeholder(&self, value: &str) -> String {
        if value.trim().is_empty() {
            self.placeholder.clone()
        } else {
            value.to_string()
        }
    }
}

fn applies(partial: &PartialResult, source: Option<&SourceTag>, url: &str) -> bool {
    let admitted = match (&partial.scope, source) {
        (Scope::AllSources, _) => true,
        (Scope::Only(_), None) => false,
        (scope, Some(tag)) => scope.admits(tag),
    };

    // Hong Kong batch distribution only describes records whose page is the PDF itself.
    let hk_batch = partial.origin == Origin::DocumentBatch
        && partial.scope == Scope::Only(SourceTag::HongKongCfs);

    admitted && (!hk_batch || url.ends_with(".pdf"))
}

/// Source-specific cleanup of a raw partial value. Unknown combinations are
/// returned unchanged.
pub fn post_process(
    origin: Origin,
    field: Field,
    source: Option<&SourceTag>,
    url: &str,
    raw: &str,
) -> String {
    match (origin, field, source) {
        (Origin::Classification, Field::Distribution, _) => {
            let cleaned = split_quoted_list(raw);
            if cleaned.contains("全國") || cleaned.contains("全国") {
                "National".to_string()
            } else {
                cleaned
            }
        }
        (Origin::Classification, Field::RecallReason, _) => raw.replace("\", \"", ",").trim().to_string(),
        (Origin::DocumentBatch, Field::Distribution, Some(SourceTag::UsCdph)) => {
            let cleaned = raw
                .replace('\n', " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if cleaned.contains("Retail") {
                format!("{cleaned},RETAIL_LINK:{}", retail_list_url(url))
            } else {
                cleaned
            }
        }
        (Origin::DocumentBatch, Field::Distribution, Some(SourceTag::HongKongCfs)) => {
            split_quoted_list(raw)
        }
        _ => raw.to_string(),
    }
}

/// `a", "b` becomes `a\nb`; surrounding whitespace and quotes are dropped.
fn split_quoted_list(raw: &str) -> String {
    raw.replace("\", \"", "\n")
        .trim()
        .trim_matches('"')
        .to_string()
}

/// URL of the retail distribution list that accompanies a CDPH notice.
fn retail_list_url(url: &str) -> String {
    static MONTH_DIR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"/[A-Za-z]+20\d{2}/").expect("valid regex"));
    static NOTICE_SUFFIX_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"n\.pdf$").expect("valid regex"));

    let lists_dir = MONTH_DIR_RE.replace_all(url, "/ProductandRetailDistributionLists/");
    NOTICE_SUFFIX_RE.replace(&lists_dir, "d.pdf").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(s: &str) -> GlobalId {
        GlobalId::from(s)
    }

    fn meta(entries: &[(&str, SourceTag, &str)]) -> HashMap<GlobalId, RecordMeta> {
        entries
            .iter()
            .map(|(id, source, url)| {
                (
                    gid(id),
                    RecordMeta {
                        title: format!("title {id}"),
                        url: url.to_string(),
                        source: source.clone(),
                        products: vec![format!("images/{id}_1.png")],
                    },
                )
            })
            .collect()
    }

    fn partial(origin: Origin, field: Field, scope: Scope, entries: &[(&str, &str)]) -> PartialResult {
        PartialResult::new(origin, field, scope).with_entries(
            entries
                .iter()
                .map(|(id, value)| (gid(id), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn shape_follows_keys() {
        let keys = vec![gid("c"), gid("a"), gid("b")];
        let records = ResultAggregator::default().merge(&keys, &HashMap::new(), &[]);

        assert_eq!(records.len(), 3);
        let ids: Vec<_> = records.iter().map(|r| r.global_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(records[2].num, 3);
        for r in &records {
            assert_eq!(r.title, "--");
            assert_eq!(r.url, "--");
            assert_eq!(r.source, "--");
            assert_eq!(r.distribution, "--");
            assert_eq!(r.recall_reason, "--");
            assert_eq!(r.screening, "--");
            assert!(r.products.is_empty());
        }
    }

    #[test]
    fn last_applicable_source_wins() {
        let keys = vec![gid("a"), gid("b")];
        let meta = meta(&[("a", SourceTag::UsFda, "u"), ("b", SourceTag::Rasff, "u")]);
        let partials = vec![
            partial(Origin::Classification, Field::RecallReason, Scope::AllSources, &[("a", "first"), ("b", "first")]),
            partial(Origin::Extraction, Field::RecallReason, Scope::Only(SourceTag::UsFda), &[("a", "fda"), ("b", "fda")]),
            partial(Origin::Extraction, Field::Title, Scope::Only(SourceTag::Rasff), &[("b", "rasff title")]),
        ];

        let records = ResultAggregator::default().merge(&keys, &meta, &partials);
        assert_eq!(records[0].recall_reason, "fda");
        assert_eq!(records[1].recall_reason, "first");
        assert_eq!(records[0].title, "title a");
        assert_eq!(records[1].title, "rasff title");
        assert_eq!(records[1].source, "RASFF");
    }

    #[test]
    fn later_duplicate_key_wins_within_partial() {
        let keys = vec![gid("a")];
        let partials = vec![partial(
            Origin::Extraction,
            Field::Screening,
            Scope::AllSources,
            &[("a", "no"), ("a", "yes")],
        )];
        let records = ResultAggregator::default().merge(&keys, &HashMap::new(), &partials);
        assert_eq!(records[0].screening, "yes");
    }

    #[test]
    fn empty_is_miss_and_sentinel_is_hit() {
        let keys = vec![gid("a"), gid("b")];
        let meta = meta(&[("a", SourceTag::Efsa, "u"), ("b", SourceTag::Efsa, "u")]);
        let partials = vec![
            partial(Origin::Classification, Field::Distribution, Scope::AllSources, &[("a", "Europe"), ("b", "Europe")]),
            partial(Origin::Extraction, Field::Distribution, Scope::Only(SourceTag::Efsa), &[("a", "--"), ("b", "  ")]),
        ];

        let records = ResultAggregator::new("n/a").merge(&keys, &meta, &partials);
        assert_eq!(records[0].distribution, "n/a");
        assert_eq!(records[1].distribution, "Europe");
        assert_eq!(records[1].recall_reason, "n/a");
    }

    #[test]
    fn classification_distribution_cleanup() {
        let cleaned = post_process(
            Origin::Classification,
            Field::Distribution,
            None,
            "",
            "\"California\", \"Nevada\"",
        );
        assert_eq!(cleaned, "California\nNevada");

        let national = post_process(Origin::Classification, Field::Distribution, None, "", "日本全国");
        assert_eq!(national, "National");

        let reason = post_process(
            Origin::Classification,
            Field::RecallReason,
            None,
            "",
            " Listeria\", \"Salmonella ",
        );
        assert_eq!(reason, "Listeria,Salmonella");
    }

    #[test]
    fn cdph_distribution_gets_retail_link() {
        let url = "https://www.cdph.ca.gov/Programs/CEH/DFDCS/CDPH%20Document%20Library/FDB/FoodSafetyProgram/FoodRecalls/June2025/AcmeRecall0612n.pdf";
        let cleaned = post_process(
            Origin::DocumentBatch,
            Field::Distribution,
            Some(&SourceTag::UsCdph),
            url,
            "Retail   stores\nin California",
        );
        assert_eq!(
            cleaned,
            "Retail stores in California,RETAIL_LINK:https://www.cdph.ca.gov/Programs/CEH/DFDCS/CDPH%20Document%20Library/FDB/FoodSafetyProgram/FoodRecalls/ProductandRetailDistributionLists/AcmeRecall0612d.pdf"
        );

        let plain = post_process(
            Origin::DocumentBatch,
            Field::Distribution,
            Some(&SourceTag::UsCdph),
            url,
            "Distributors\n only",
        );
        assert_eq!(plain, "Distributors only");
    }

    #[test]
    fn hk_batch_distribution_needs_pdf_url() {
        let keys = vec![gid("pdf"), gid("html")];
        let meta = meta(&[
            ("pdf", SourceTag::HongKongCfs, "https://www.cfs.gov.hk/notice.pdf"),
            ("html", SourceTag::HongKongCfs, "https://www.cfs.gov.hk/notice.html"),
        ]);
        let partials = vec![partial(
            Origin::DocumentBatch,
            Field::Distribution,
            Scope::Only(SourceTag::HongKongCfs),
            &[("pdf", "\"Shop A\", \"Shop B\""), ("html", "\"Shop C\"")],
        )];

        let records = ResultAggregator::default().merge(&keys, &meta, &partials);
        assert_eq!(records[0].distribution, "Shop A\nShop B");
        assert_eq!(records[1].distribution, "--");
    }

    #[test]
    fn scoped_partial_ignores_unknown_records() {
        let keys = vec![gid("x")];
        let partials = vec![partial(
            Origin::Extraction,
            Field::Distribution,
            Scope::Only(SourceTag::Canada),
            &[("x", "Ontario")],
        )];
        let records = ResultAggregator::default().merge(&keys, &HashMap::new(), &partials);
        assert_eq!(records[0].distribution, "--");
    }
}
