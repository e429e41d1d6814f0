//! Writes the merged record list as a JSON report.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use recallbrief_shared::{RecallBriefError, Record, Result};

/// Writes `report-{timestamp}-{hash}.json` files under one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write `records` as pretty JSON and return the file path.
    pub async fn write(&self, records: &[Record]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| RecallBriefError::io(&self.output_dir, e))?;

        let path = self.output_dir.join(report_file_name(records, Utc::now()));
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| RecallBriefError::parse(format!("failed to serialize report: {e}")))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| RecallBriefError::io(&path, e))?;

        info!(path = %path.display(), records = records.len(), "report written");
        Ok(path)
    }
}

fn report_file_name(records: &[Record], at: DateTime<Utc>) -> String {
    format!(
        "report-{}-{}.json",
        at.format("%Y%m%d-%H%M%S"),
        ids_hash(records)
    )
}

/// First 12 hex chars of SHA-256 over the ids, newline-separated.
fn ids_hash(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.global_id.as_str().as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}
