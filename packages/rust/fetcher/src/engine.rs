//! Bounded-concurrency artifact fetcher.
//!
//! Every target is checked on disk first; only missing artifacts take a
//! concurrency permit and touch the network. Each attempt waits the
//! inter-request delay, rotates its identity headers, and is classified as
//! transient or permanent for the retry policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, REFERER, USER_AGENT};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use recallbrief_shared::{
    FetchConfig, FetchOutcome, FetchStatus, FetchTarget, RecallBriefError, Result,
};

use crate::identity::RequestIdentity;
use crate::layout::{existing_artifact, existing_image};
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// ConcurrentFetcher
// ---------------------------------------------------------------------------

/// Downloads fetch targets under a global concurrency cap.
#[derive(Clone)]
pub struct ConcurrentFetcher {
    client: Client,
    config: FetchConfig,
    policy: RetryPolicy,
}

impl ConcurrentFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| RecallBriefError::Network(format!("failed to build HTTP client: {e}")))?;

        let policy = RetryPolicy::linear(config.max_attempts, config.retry_delay);

        Ok(Self {
            client,
            config,
            policy,
        })
    }

    /// Fetch every target. Returns exactly one outcome per target, in input order.
    #[instrument(skip_all, fields(targets = targets.len(), max_concurrent = self.config.max_concurrent))]
    pub async fn fetch(&self, targets: Vec<FetchTarget>) -> Vec<FetchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            let fetcher = self.clone();
            let sem = semaphore.clone();
            let fallback = target.clone();

            let handle = tokio::spawn(async move { fetcher.fetch_one(target, &sem).await });
            handles.push((fallback, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (fallback, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => FetchOutcome {
                    target: fallback,
                    status: FetchStatus::Failed {
                        error: format!("fetch task failed: {e}"),
                    },
                    attempts: 0,
                },
            };
            outcomes.push(outcome);
        }

        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o.status, FetchStatus::Materialized { skipped: true, .. }))
            .count();
        let failed = outcomes.iter().filter(|o| !o.is_materialized()).count();

        info!(
            materialized = outcomes.len() - failed,
            skipped,
            failed,
            "fetch completed"
        );

        outcomes
    }

    async fn fetch_one(&self, target: FetchTarget, semaphore: &Semaphore) -> FetchOutcome {
        let existing = if target.kind.is_document() {
            existing_artifact(&target.destination).await
        } else {
            existing_image(&target.destination).await
        };
        if let Some(path) = existing {
            debug!(owner = %target.owner, path = %path.display(), "artifact exists, skipping");
            return FetchOutcome {
                target,
                status: FetchStatus::Materialized {
                    path,
                    skipped: true,
                },
                attempts: 0,
            };
        }

        let Ok(_permit) = semaphore.acquire().await else {
            return FetchOutcome {
                target,
                status: FetchStatus::Failed {
                    error: "fetch semaphore closed".into(),
                },
                attempts: 0,
            };
        };

        let (result, attempts) = self
            .policy
            .run(|attempt| {
                let target = &target;
                async move {
                    if !self.config.request_delay.is_zero() {
                        tokio::time::sleep(self.config.request_delay).await;
                    }
                    download(&self.client, target, attempt).await
                }
            })
            .await;

        let status = match result {
            Ok(path) => FetchStatus::Materialized {
                path,
                skipped: false,
            },
            Err(e) => {
                warn!(owner = %target.owner, uri = %target.uri, attempts, error = %e, "fetch failed");
                FetchStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        FetchOutcome {
            target,
            status,
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Single attempt
// ---------------------------------------------------------------------------

/// One download attempt. Writes the artifact only when the body is non-empty
/// and of the expected kind.
async fn download(client: &Client, target: &FetchTarget, attempt: u32) -> Result<PathBuf> {
    let identity = RequestIdentity::for_attempt(&target.uri, attempt);
    debug!(owner = %target.owner, uri = %target.uri, attempt, "fetching artifact");

    let response = client
        .get(&target.uri)
        .header(USER_AGENT, identity.user_agent)
        .header(REFERER, identity.referer)
        .header(ACCEPT, target.kind.accept_header())
        .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| classify_send_error(&target.uri, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RecallBriefError::from_status(status.as_u16(), &target.uri));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !target.kind.accepts(&content_type, &target.uri) {
        return Err(RecallBriefError::Permanent(format!(
            "{}: unexpected content type '{content_type}'",
            target.uri
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| RecallBriefError::Transient(format!("{}: body read failed: {e}", target.uri)))?;
    if body.is_empty() {
        return Err(RecallBriefError::Transient(format!(
            "{}: empty response body",
            target.uri
        )));
    }

    write_artifact(&target.destination, &body).await?;
    Ok(target.destination.clone())
}

fn classify_send_error(uri: &str, e: reqwest::Error) -> RecallBriefError {
    if e.is_builder() {
        RecallBriefError::Permanent(format!("{uri}: invalid request: {e}"))
    } else {
        RecallBriefError::Transient(format!("{uri}: {e}"))
    }
}

/// Write through a `.part` file so a failed write never leaves a partial or
/// zero-byte artifact at the destination.
async fn write_artifact(destination: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RecallBriefError::io(parent, e))?;
    }

    let mut part = destination.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    if let Err(e) = tokio::fs::write(&part, bytes).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(RecallBriefError::io(&part, e));
    }

    if let Err(e) = tokio::fs::rename(&part, destination).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(RecallBriefError::io(destination, e));
    }

    Ok(())
}
