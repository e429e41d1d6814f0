//! Fan-out of one request into fetch targets.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use recallbrief_fetcher::ArtifactLayout;
use recallbrief_shared::{ArtifactKind, EnrichRequest, FetchTarget, GlobalId, RawItem};

/// Marker a CDPH notice URL must contain.
const CDPH_PATH_MARKER: &str = "/CEH/DFDCS/CDPH";

const CDPH_ANCHOR_PATTERN: &str = r#"^(<a )?href="(https://www\.[^\s"]+\.pdf)""#;

const HK_DOCUMENT_PATTERN: &str = r"^https://www\.cfs\.gov\.hk/.*\.pdf$";

/// Label PDF links, tried in order.
const LABEL_PATTERNS: &[&str] = &[
    r#"href="(https://www\.fsis\.usda\.gov/sites/default/files/food_label_pdf/[^"]+\.pdf)""#,
    r#"href="(https://s3-eu-west-1\.amazonaws\.com/fsa-alerts-files/production/[^"]+\.pdf)""#,
];

static DEFAULT_RULES: LazyLock<DocumentRules> = LazyLock::new(|| DocumentRules {
    cdph_anchor: Regex::new(CDPH_ANCHOR_PATTERN).expect("valid regex"),
    cdph_marker: CDPH_PATH_MARKER.to_string(),
    hk_url: Regex::new(HK_DOCUMENT_PATTERN).expect("valid regex"),
    labels: LABEL_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect(),
});

/// How documents are recognized in raw items.
#[derive(Debug, Clone)]
pub struct DocumentRules {
    /// Anchored at the start of the body; capture group 2 is the PDF URL.
    pub cdph_anchor: Regex,
    /// Substring the CDPH PDF URL must contain.
    pub cdph_marker: String,
    /// Item URLs that are themselves Hong Kong CFS notices.
    pub hk_url: Regex,
    /// Label PDF links; capture group 1 is the URL.
    pub labels: Vec<Regex>,
}

impl Default for DocumentRules {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

impl DocumentRules {
    /// CDPH notices are bodies that start with a PDF anchor under the CDPH path.
    pub fn cdph_document_url(&self, content: &str) -> Option<String> {
        let caps = self.cdph_anchor.captures(content.trim_start())?;
        let url = caps.get(2)?.as_str();
        url.contains(self.cdph_marker.as_str()).then(|| url.to_string())
    }

    pub fn is_hk_document(&self, url: &str) -> bool {
        self.hk_url.is_match(url.trim())
    }

    /// First label PDF linked from the body, by rule order.
    pub fn label_document_url(&self, content: &str) -> Option<String> {
        self.labels
            .iter()
            .find_map(|re| re.captures(content))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Builds [`FetchTarget`]s with deterministic destinations.
#[derive(Debug, Clone)]
pub struct TargetPlanner {
    layout: ArtifactLayout,
    rules: DocumentRules,
}

impl TargetPlanner {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self::with_rules(layout, DocumentRules::default())
    }

    pub fn with_rules(layout: ArtifactLayout, rules: DocumentRules) -> Self {
        Self { layout, rules }
    }

    /// Targets in request order: each record's product images, then its
    /// documents. Items for ids not in the request are ignored.
    pub fn plan(&self, request: &EnrichRequest, items: &[RawItem]) -> Vec<FetchTarget> {
        let by_id: HashMap<&GlobalId, &RawItem> =
            items.iter().map(|item| (&item.global_id, item)).collect();
        let mut targets = Vec::new();

        for gid in &request.global_ids {
            if let Some(urls) = request.images_by_global_id.get(gid) {
                for (i, url) in urls.iter().enumerate() {
                    let url = url.trim();
                    if url.is_empty() {
                        continue;
                    }
                    let index = (i + 1) as u32;
                    targets.push(FetchTarget {
                        owner: gid.clone(),
                        index,
                        uri: url.to_string(),
                        destination: self.layout.product_image(gid, index),
                        kind: ArtifactKind::ProductImage,
                    });
                }
            }

            let Some(item) = by_id.get(gid) else {
                continue;
            };
            targets.extend(self.document_targets(item));
        }

        debug!(targets = targets.len(), "fetch targets planned");
        targets
    }

    fn document_targets(&self, item: &RawItem) -> Vec<FetchTarget> {
        let gid = &item.global_id;
        let mut targets = Vec::new();
        let mut push = |uri: String, destination: PathBuf, kind: ArtifactKind| {
            targets.push(FetchTarget {
                owner: gid.clone(),
                index: 1,
                uri,
                destination,
                kind,
            })
        };

        if let Some(uri) = self.rules.cdph_document_url(&item.content) {
            push(uri, self.layout.cdph_document(gid), ArtifactKind::CdphDocument);
        }
        if self.rules.is_hk_document(&item.url) {
            push(
                item.url.trim().to_string(),
                self.layout.hk_document(gid),
                ArtifactKind::HongKongDocument,
            );
        }
        if let Some(uri) = self.rules.label_document_url(&item.content) {
            push(uri, self.layout.label_document(gid), ArtifactKind::LabelDocument);
        }

        targets
    }
}
