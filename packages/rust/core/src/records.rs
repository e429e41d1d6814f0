//! Resolving GlobalIDs into raw source items.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use recallbrief_shared::{GlobalId, RawItem, RecallBriefError, Result};

/// Looks up the raw items behind a list of ids. Missing ids are simply absent.
pub trait RecordSource: Send + Sync {
    fn resolve(&self, ids: &[GlobalId]) -> impl Future<Output = Result<Vec<RawItem>>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP lookup
// ---------------------------------------------------------------------------

/// Posts `{ docid, variables: { globalId: [...] } }` and reads
/// `data.searchByGlobalId`.
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    client: Client,
    url: String,
    doc_id: String,
}

impl HttpRecordSource {
    pub fn new(url: impl Into<String>, doc_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecallBriefError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            doc_id: doc_id.into(),
        })
    }
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    docid: &'a str,
    variables: LookupVariables<'a>,
}

#[derive(Serialize)]
struct LookupVariables<'a> {
    #[serde(rename = "globalId")]
    global_id: &'a [GlobalId],
}

impl RecordSource for HttpRecordSource {
    #[instrument(skip_all, fields(ids = ids.len()))]
    async fn resolve(&self, ids: &[GlobalId]) -> Result<Vec<RawItem>> {
        let body = LookupRequest {
            docid: &self.doc_id,
            variables: LookupVariables { global_id: ids },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RecallBriefError::Network(format!("record lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecallBriefError::from_status(status.as_u16(), "record lookup"));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RecallBriefError::parse(format!("record lookup response: {e}")))?;
        let items = payload
            .pointer("/data/searchByGlobalId")
            .cloned()
            .ok_or_else(|| RecallBriefError::parse("record lookup response has no data.searchByGlobalId"))?;

        let items: Vec<RawItem> = serde_json::from_value(items)
            .map_err(|e| RecallBriefError::parse(format!("record lookup items: {e}")))?;
        debug!(items = items.len(), "records resolved");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Static file
// ---------------------------------------------------------------------------

/// Items loaded once from a JSON file: either a bare array of items or a full
/// lookup response.
#[derive(Debug, Clone, Default)]
pub struct StaticRecordSource {
    items: Vec<RawItem>,
}

impl StaticRecordSource {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self { items }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RecallBriefError::io(path, e))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| RecallBriefError::parse(format!("{}: {e}", path.display())))?;

        let items = value
            .pointer("/data/searchByGlobalId")
            .cloned()
            .unwrap_or(value);
        let items = serde_json::from_value(items)
            .map_err(|e| RecallBriefError::parse(format!("{}: {e}", path.display())))?;

        Ok(Self { items })
    }
}

impl RecordSource for StaticRecordSource {
    async fn resolve(&self, ids: &[GlobalId]) -> Result<Vec<RawItem>> {
        let wanted: HashSet<&GlobalId> = ids.iter().collect();
        Ok(self
            .items
            .iter()
            .filter(|item| wanted.contains(&item.global_id))
            .cloned()
            .collect())
    }
}
