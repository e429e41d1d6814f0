//! Chunked upload-then-run processing of document units.
//!
//! Units are split into contiguous chunks that run one after another. Inside
//! a chunk the document uploads and the page-image uploads run as two
//! concurrent groups; the chunk then invokes either the documents-only or
//! the documents-plus-images operation. A failed chunk is recorded and the
//! next one proceeds.

use std::path::Path;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use recallbrief_shared::{BatchConfig, GlobalId, ProcessingUnit, RecallBriefError, Result, UploadKind};

use crate::remote::{RemoteService, WorkflowOutputs, WorkflowRequest, keyed_entries, output_items};

/// Operation a chunk invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOperation {
    DocumentsOnly,
    DocumentsAndImages,
}

/// Outputs of every successful chunk, concatenated in chunk order.
#[derive(Debug, Default)]
pub struct AccumulatedOutputs {
    lists: WorkflowOutputs,
    /// Operation of each chunk that reached the remote service.
    pub invocations: Vec<ChunkOperation>,
    /// One [`RecallBriefError::ChunkFailure`] per failed or skipped chunk.
    pub failures: Vec<RecallBriefError>,
}

impl AccumulatedOutputs {
    /// Items accumulated under `name`.
    pub fn list(&self, name: &str) -> &[Value] {
        match self.lists.get(name) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Keyed `(gid, value)` pairs of the named list.
    pub fn entries(&self, name: &str, field: &str) -> Vec<(GlobalId, String)> {
        keyed_entries(&self.lists, name, field)
    }

    /// Append every list-valued output; other outputs are ignored.
    fn absorb(&mut self, outputs: WorkflowOutputs) {
        for (name, value) in outputs {
            let Some(items) = output_items(&value) else {
                continue;
            };
            let slot = self
                .lists
                .entry(name)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(existing) = slot {
                existing.extend(items);
            }
        }
    }
}

/// Drives [`ProcessingUnit`]s through a [`RemoteService`] in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: BatchConfig,
    user: String,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig, user: impl Into<String>) -> Self {
        Self {
            config,
            user: user.into(),
        }
    }

    /// Process every unit. Never fails as a whole; chunk failures end up in
    /// [`AccumulatedOutputs::failures`].
    #[instrument(skip_all, fields(units = units.len(), chunk_size = self.config.chunk_size))]
    pub async fn process_all<S: RemoteService>(
        &self,
        units: &[ProcessingUnit],
        service: &S,
    ) -> AccumulatedOutputs {
        let mut accumulated = AccumulatedOutputs::default();
        if units.is_empty() {
            info!("no documents to process");
            return accumulated;
        }

        let chunks: Vec<&[ProcessingUnit]> = units.chunks(self.config.chunk_size.max(1)).collect();
        let total = chunks.len();
        info!(chunks = total, "processing document chunks");

        for (i, chunk) in chunks.into_iter().enumerate() {
            let number = i + 1;
            match self.process_chunk(number, chunk, service).await {
                Ok((operation, outputs)) => {
                    debug!(chunk = number, ?operation, "chunk completed");
                    accumulated.invocations.push(operation);
                    accumulated.absorb(outputs);
                }
                Err(e) => {
                    let failure = match e {
                        failure @ RecallBriefError::ChunkFailure { .. } => failure,
                        other => RecallBriefError::ChunkFailure {
                            chunk: number,
                            message: other.to_string(),
                        },
                    };
                    warn!(chunk = number, error = %failure, "chunk failed");
                    accumulated.failures.push(failure);
                }
            }

            if !self.config.chunk_pause.is_zero() {
                tokio::time::sleep(self.config.chunk_pause).await;
            }
        }

        info!(
            chunks = total,
            invoked = accumulated.invocations.len(),
            failed = accumulated.failures.len(),
            "batch processing completed"
        );
        accumulated
    }

    async fn process_chunk<S: RemoteService>(
        &self,
        number: usize,
        chunk: &[ProcessingUnit],
        service: &S,
    ) -> Result<(ChunkOperation, WorkflowOutputs)> {
        let documents: Vec<&Path> = chunk.iter().map(|u| u.primary.as_path()).collect();
        let images: Vec<&Path> = chunk.iter().filter_map(|u| u.secondary.as_deref()).collect();
        debug!(
            chunk = number,
            documents = documents.len(),
            images = images.len(),
            "uploading chunk"
        );

        let (document_ids, image_ids) = tokio::join!(
            upload_group(service, &documents, UploadKind::Document, &self.user),
            upload_group(service, &images, UploadKind::Image, &self.user),
        );

        if document_ids.is_empty() {
            return Err(RecallBriefError::ChunkFailure {
                chunk: number,
                message: "no documents uploaded, chunk skipped".into(),
            });
        }

        let operation = if image_ids.is_empty() {
            ChunkOperation::DocumentsOnly
        } else {
            ChunkOperation::DocumentsAndImages
        };
        let request = WorkflowRequest::documents(&document_ids, &image_ids, &self.user);
        let outputs = service.run_workflow(request).await?;

        Ok((operation, outputs))
    }
}

/// Upload concurrently; failed uploads are logged and dropped.
async fn upload_group<S: RemoteService>(
    service: &S,
    paths: &[&Path],
    kind: UploadKind,
    user: &str,
) -> Vec<String> {
    let uploads = paths.iter().map(|path| async move {
        match service.upload_file(path, kind, user).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "upload failed");
                None
            }
        }
    });

    join_all(uploads).await.into_iter().flatten().collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use crate::remote::Workflow;

    /// In-memory service. Upload ids are file stems; the document workflow
    /// echoes `dist-{owner}` per document into `hk_distribution_dict_list`,
    /// with the owner taken from the stem minus its `hk_`/`cdph_` prefix.
    #[derive(Default)]
    pub(crate) struct FakeService {
        pub failing_uploads: HashSet<String>,
        pub failing_runs: usize,
        pub runs: Mutex<Vec<WorkflowRequest>>,
        pub classification: Option<WorkflowOutputs>,
    }

    impl FakeService {
        pub fn runs(&self) -> Vec<WorkflowRequest> {
            self.runs.lock().unwrap().clone()
        }
    }

    impl RemoteService for FakeService {
        async fn upload_file(&self, path: &Path, _kind: UploadKind, _user: &str) -> Result<String> {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.failing_uploads.contains(&stem) {
                return Err(RecallBriefError::Remote(format!("upload of {stem} refused")));
            }
            Ok(stem)
        }

        async fn run_workflow(&self, request: WorkflowRequest) -> Result<WorkflowOutputs> {
            let run_number = {
                let mut runs = self.runs.lock().unwrap();
                runs.push(request.clone());
                runs.len()
            };

            if request.workflow == Workflow::Classification {
                return self
                    .classification
                    .clone()
                    .ok_or_else(|| RecallBriefError::Remote("classification unavailable".into()));
            }
            if run_number <= self.failing_runs {
                return Err(RecallBriefError::Remote("workflow exploded".into()));
            }

            let items: Vec<Value> = request.inputs["file_pdf"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .iter()
                .filter_map(|f| f["upload_file_id"].as_str().map(str::to_string))
                .map(|id| {
                    let owner = id
                        .strip_prefix("hk_")
                        .or_else(|| id.strip_prefix("cdph_"))
                        .unwrap_or(&id)
                        .to_string();
                    let mut entry = WorkflowOutputs::new();
                    entry.insert(owner.clone(), json!(format!("dist-{owner}")));
                    Value::Object(entry)
                })
                .collect();

            let mut outputs = WorkflowOutputs::new();
            outputs.insert("hk_distribution_dict_list".into(), Value::Array(items));
            outputs.insert("summary".into(), json!("ignored"));
            Ok(outputs)
        }
    }

    fn units(ids: &[&str]) -> Vec<ProcessingUnit> {
        ids.iter()
            .map(|id| ProcessingUnit {
                owner: GlobalId::from(*id),
                primary: PathBuf::from(format!("{id}.pdf")),
                secondary: None,
            })
            .collect()
    }

    fn processor(chunk_size: usize) -> BatchProcessor {
        BatchProcessor::new(
            BatchConfig {
                chunk_size,
                chunk_pause: Duration::ZERO,
            },
            "tester",
        )
    }

    fn documents_per_run(service: &FakeService) -> Vec<usize> {
        service
            .runs()
            .iter()
            .map(|r| r.inputs["file_pdf"].as_array().map(Vec::len).unwrap_or(0))
            .collect()
    }

    #[tokio::test]
    async fn one_invoke_per_chunk() {
        let service = FakeService::default();
        let out = processor(2)
            .process_all(&units(&["a", "b", "c", "d", "e"]), &service)
            .await;

        assert_eq!(documents_per_run(&service), vec![2, 2, 1]);
        assert_eq!(out.invocations.len(), 3);
        assert!(out.failures.is_empty());

        let ids: Vec<_> = out
            .entries("hk_distribution_dict_list", "distribution")
            .into_iter()
            .map(|(gid, _)| gid.0)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert!(out.list("summary").is_empty());
    }

    #[tokio::test]
    async fn failed_middle_chunk_keeps_neighbours() {
        let service = FakeService {
            failing_uploads: ["c", "d"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let out = processor(2)
            .process_all(&units(&["a", "b", "c", "d", "e"]), &service)
            .await;

        assert_eq!(documents_per_run(&service), vec![2, 1]);
        assert_eq!(out.failures.len(), 1);
        assert!(matches!(out.failures[0], RecallBriefError::ChunkFailure { chunk: 2, .. }));

        let entries = out.entries("hk_distribution_dict_list", "distribution");
        let ids: Vec<_> = entries.iter().map(|(gid, _)| gid.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "e"]);
        assert_eq!(entries[2].1, "dist-e");
    }

    #[tokio::test]
    async fn run_failure_does_not_stop_next_chunk() {
        let service = FakeService {
            failing_runs: 1,
            ..Default::default()
        };
        let out = processor(2)
            .process_all(&units(&["a", "b", "c"]), &service)
            .await;

        assert_eq!(service.runs().len(), 2);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.list("hk_distribution_dict_list").len(), 1);
    }

    #[tokio::test]
    async fn any_secondary_switches_operation() {
        let mut all = units(&["a", "b", "c", "d"]);
        all[1].secondary = Some(PathBuf::from("b_page.png"));

        let service = FakeService::default();
        let out = processor(2).process_all(&all, &service).await;

        assert_eq!(
            out.invocations,
            vec![ChunkOperation::DocumentsAndImages, ChunkOperation::DocumentsOnly]
        );
        let runs = service.runs();
        assert!(runs[0].has_images());
        assert!(!runs[1].has_images());
    }

    #[tokio::test]
    async fn no_units_no_calls() {
        let service = FakeService::default();
        let out = processor(9).process_all(&[], &service).await;
        assert!(service.runs().is_empty());
        assert!(out.invocations.is_empty());
    }

    #[tokio::test]
    async fn pause_follows_each_chunk() {
        let pause = Duration::from_millis(100);
        let processor = BatchProcessor::new(
            BatchConfig {
                chunk_size: 2,
                chunk_pause: pause,
            },
            "tester",
        );
        let service = FakeService::default();

        let started = std::time::Instant::now();
        let out = processor
            .process_all(&units(&["a", "b", "c", "d", "e"]), &service)
            .await;
        let elapsed = started.elapsed();

        assert_eq!(out.invocations.len(), 3);
        assert!(elapsed >= pause * 3, "finished in {elapsed:?}");
    }
}
