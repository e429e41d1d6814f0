//! Core domain types for RecallBrief enrichment runs.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GlobalId
// ---------------------------------------------------------------------------

/// Opaque, request-stable identifier of a source record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(pub String);

impl GlobalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GlobalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GlobalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for GlobalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// SourceTag
// ---------------------------------------------------------------------------

/// Known recall publishers. Anything unrecognized is `Other` and gets no
/// source-specific handling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceTag {
    Fsai,
    Fsanz,
    NzMpi,
    Canada,
    UkFsa,
    UsFda,
    UsFsis,
    UsCdph,
    Fss,
    Fao,
    Woah,
    Who,
    FrenchMinistry,
    Efsa,
    Accc,
    Mdard,
    Oha,
    Cfia,
    JapanCaa,
    Rasff,
    RappelConso,
    NswFoodAuthority,
    HongKongCfs,
    Other(String),
}

impl SourceTag {
    /// Display label written into the `source` field of a record.
    pub fn label(&self) -> &str {
        match self {
            Self::Fsai => "FSAI",
            Self::Fsanz => "FSANZ",
            Self::NzMpi => "NZ MPI",
            Self::Canada => "Government of Canada",
            Self::UkFsa => "UK FSA",
            Self::UsFda => "US FDA",
            Self::UsFsis => "US FSIS",
            Self::UsCdph => "US CDPH",
            Self::Fss => "FSS",
            Self::Fao => "FAO",
            Self::Woah => "WOAH",
            Self::Who => "WHO",
            Self::FrenchMinistry => "The French Ministry of Agriculture and Food",
            Self::Efsa => "EFSA",
            Self::Accc => "ACCC",
            Self::Mdard => "MDARD",
            Self::Oha => "OHA",
            Self::Cfia => "CFIA",
            Self::JapanCaa => "Consumer Affairs Agency, Government of Japan",
            Self::Rasff => "RASFF",
            Self::RappelConso => "Rappel Conso",
            Self::NswFoodAuthority => "NSW Food Authority",
            Self::HongKongCfs => "香港食物安全中心",
            Self::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Request / raw items
// ---------------------------------------------------------------------------

/// One enrichment request, as submitted by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    /// Canonical key order of the output.
    pub global_ids: Vec<GlobalId>,
    /// Product image URLs per record; order defines the 1-based index.
    #[serde(default)]
    pub images_by_global_id: HashMap<GlobalId, Vec<String>>,
    /// Caller identity forwarded to the remote service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A source record as returned by a record lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(rename = "globalId")]
    pub global_id: GlobalId,
    #[serde(default)]
    pub url: String,
    /// Publisher name as written by the source.
    #[serde(default, rename = "from")]
    pub publisher: String,
    #[serde(default)]
    pub title: String,
    /// Raw HTML body.
    #[serde(default)]
    pub content: String,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Canonical output record. Field order matches the rendered report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based position in the request.
    pub num: usize,
    pub title: String,
    pub url: String,
    pub source: String,
    pub distribution: String,
    pub recall_reason: String,
    /// Remote "is or not" screening verdict.
    pub screening: String,
    /// Materialized product image paths.
    pub products: Vec<String>,
    pub global_id: GlobalId,
}

/// Mergeable record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Distribution,
    RecallReason,
    Screening,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// What a fetched artifact is; drives both the storage path and content validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ProductImage,
    CdphDocument,
    HongKongDocument,
    LabelDocument,
}

impl ArtifactKind {
    pub fn is_document(&self) -> bool {
        !matches!(self, Self::ProductImage)
    }

    /// Whether a response with this content type is an acceptable body.
    pub fn accepts(&self, content_type: &str, uri: &str) -> bool {
        let ct = content_type.to_ascii_lowercase();
        if ct.starts_with("application/octet-stream") {
            return true;
        }
        match self {
            Self::ProductImage => ct.contains("image"),
            _ => ct.contains("pdf") || uri.to_ascii_lowercase().ends_with(".pdf"),
        }
    }

    /// Value sent in the `Accept` header.
    pub fn accept_header(&self) -> &'static str {
        match self {
            Self::ProductImage => {
                "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"
            }
            _ => "application/pdf,*/*",
        }
    }
}

/// One remote resource to materialize on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTarget {
    pub owner: GlobalId,
    /// 1-based index within the owner; documents use 1.
    pub index: u32,
    pub uri: String,
    pub destination: PathBuf,
    pub kind: ArtifactKind,
}

/// Terminal state of one fetch target.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Materialized { path: PathBuf, skipped: bool },
    Failed { error: String },
}

/// Result of fetching one target. Always one per input target.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub target: FetchTarget,
    pub status: FetchStatus,
    pub attempts: u32,
}

impl FetchOutcome {
    /// Path of the materialized file, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match &self.status {
            FetchStatus::Materialized { path, .. } => Some(path),
            FetchStatus::Failed { .. } => None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.path().is_some()
    }
}

// ---------------------------------------------------------------------------
// Batch processing
// ---------------------------------------------------------------------------

/// A document to send through the remote document workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingUnit {
    pub owner: GlobalId,
    /// PDF document.
    pub primary: PathBuf,
    /// Optional rendered page image.
    pub secondary: Option<PathBuf>,
}

/// How an uploaded file is declared to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Document,
    Image,
}

impl UploadKind {
    /// Value of the multipart `type` field.
    pub fn type_field(&self) -> &'static str {
        match self {
            Self::Document => "pdf",
            Self::Image => "png",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Document => "application/pdf",
            Self::Image => "image/png",
        }
    }

    /// Value of the `type` key in workflow file inputs.
    pub fn input_type(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
        }
    }
}

// ---------------------------------------------------------------------------
// Partial results
// ---------------------------------------------------------------------------

/// Which records a partial result may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    AllSources,
    Only(SourceTag),
}

impl Scope {
    pub fn admits(&self, tag: &SourceTag) -> bool {
        match self {
            Self::AllSources => true,
            Self::Only(only) => only == tag,
        }
    }
}

/// Producer of a partial result; selects the post-processing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Per-record classification workflow.
    Classification,
    /// Chunked document workflow.
    DocumentBatch,
    /// Local per-source extraction rules.
    Extraction,
}

/// One enrichment source's keyed values for one field.
#[derive(Debug, Clone)]
pub struct PartialResult {
    pub origin: Origin,
    pub field: Field,
    pub scope: Scope,
    pub entries: Vec<(GlobalId, String)>,
}

impl PartialResult {
    pub fn new(origin: Origin, field: Field, scope: Scope) -> Self {
        Self {
            origin,
            field,
            scope,
            entries: Vec::new(),
        }
    }

    pub fn with_entries(mut self, entries: Vec<(GlobalId, String)>) -> Self {
        self.entries = entries;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
