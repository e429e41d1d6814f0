//! End-to-end enrichment: ids → records → fetch → documents → workflows → merge.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use recallbrief_extract::{ExtractorRegistry, ItemContent, standardize_source};
use recallbrief_fetcher::{ArtifactLayout, ArtifactSweeper, ConcurrentFetcher, existing_artifact};
use recallbrief_shared::{
    AppConfig, ArtifactKind, BatchConfig, EnrichRequest, FetchConfig, FetchOutcome, Field,
    GlobalId, Origin, PartialResult, ProcessingUnit, RawItem, RecallBriefError, Record, Result,
    Scope, SourceTag,
};

use crate::aggregate::{RecordMeta, ResultAggregator};
use crate::batch::{AccumulatedOutputs, BatchProcessor};
use crate::plan::{DocumentRules, TargetPlanner};
use crate::records::RecordSource;
use crate::remote::{ClassificationInput, RemoteService, WorkflowRequest, keyed_entries};
use crate::render::DocumentRenderer;

/// User forwarded to the remote service when the request names none.
pub const DEFAULT_USER: &str = "recallbrief";

/// Classification output lists: `(list, item field, record field)`.
const CLASSIFICATION_OUTPUTS: &[(&str, &str, Field)] = &[
    ("id_distribution_dict_list", "distribution", Field::Distribution),
    ("id_recyclingReason_dict_list", "recycling_reason", Field::RecallReason),
    ("id_isOrNot_dict_list", "is_or_not_reason", Field::Screening),
];

/// Document workflow output lists: `(list, item field, record field, source)`.
const DOCUMENT_OUTPUTS: &[(&str, &str, Field, SourceTag)] = &[
    ("cdph_title_dict_list", "title", Field::Title, SourceTag::UsCdph),
    ("cdph_distribution_dict_list", "distribution", Field::Distribution, SourceTag::UsCdph),
    ("hk_distribution_dict_list", "distribution", Field::Distribution, SourceTag::HongKongCfs),
];

/// Result of one enrichment run.
#[derive(Debug)]
pub struct EnrichmentOutcome {
    /// One record per requested id, in request order.
    pub records: Vec<Record>,
    pub fetch_failures: usize,
    pub chunk_failures: usize,
    /// Sources that failed as a whole; their fields fell back to defaults.
    pub degraded_sources: Vec<String>,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once all fetch targets have settled.
    fn fetched(&self, materialized: usize, failed: usize);
    /// Called when the run completes.
    fn done(&self, outcome: &EnrichmentOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn fetched(&self, _materialized: usize, _failed: usize) {}
    fn done(&self, _outcome: &EnrichmentOutcome) {}
}

/// Sequences every enrichment stage. No stage failure aborts the run; the
/// only error returned is for an invalid request.
pub struct EnrichmentOrchestrator<S, R, D> {
    service: S,
    records: R,
    renderer: D,
    fetcher: ConcurrentFetcher,
    planner: TargetPlanner,
    layout: ArtifactLayout,
    batch: BatchConfig,
    extractors: ExtractorRegistry,
    aggregator: ResultAggregator,
    sweeper: Option<ArtifactSweeper>,
}

impl<S, R, D> EnrichmentOrchestrator<S, R, D>
where
    S: RemoteService,
    R: RecordSource,
    D: DocumentRenderer,
{
    pub fn new(config: &AppConfig, service: S, records: R, renderer: D) -> Result<Self> {
        let layout = ArtifactLayout::new(&config.paths.data_dir);
        let sweeper = ArtifactSweeper::new(
            layout.managed_dirs(),
            config.cleanup.suffixes.clone(),
            Duration::from_secs(config.cleanup.retention_hours.saturating_mul(3600)),
        );

        Ok(Self {
            service,
            records,
            renderer,
            fetcher: ConcurrentFetcher::new(FetchConfig::from(config))?,
            planner: TargetPlanner::new(layout.clone()),
            layout,
            batch: BatchConfig::from(config),
            extractors: ExtractorRegistry::new(),
            aggregator: ResultAggregator::new(&config.defaults.placeholder),
            sweeper: Some(sweeper),
        })
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_document_rules(mut self, rules: DocumentRules) -> Self {
        self.planner = TargetPlanner::with_rules(self.layout.clone(), rules);
        self
    }

    /// Skip the pre-run sweep of managed directories.
    pub fn without_sweep(mut self) -> Self {
        self.sweeper = None;
        self
    }

    /// Run one request end to end.
    #[instrument(skip_all, fields(ids = request.global_ids.len()))]
    pub async fn run(
        &self,
        request: &EnrichRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<EnrichmentOutcome> {
        let start = Instant::now();
        validate_request(request)?;
        let user = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_USER);
        let mut degraded = Vec::new();

        info!(ids = request.global_ids.len(), %user, "starting enrichment");

        if let Some(sweeper) = &self.sweeper {
            progress.phase("Cleaning old artifacts");
            let report = sweeper.sweep().await;
            debug!(removed = report.removed, "pre-run sweep done");
        }

        // --- Records ---
        progress.phase("Resolving records");
        let items = match self.records.resolve(&request.global_ids).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "record lookup failed, every field will default");
                degraded.push("records".to_string());
                Vec::new()
            }
        };
        let items = in_request_order(&request.global_ids, items);
        let tags: HashMap<&GlobalId, SourceTag> = items
            .iter()
            .map(|item| (&item.global_id, standardize_source(&item.publisher)))
            .collect();

        // --- Fetch ---
        progress.phase("Downloading artifacts");
        let targets = self.planner.plan(request, &items);
        let outcomes = self.fetcher.fetch(targets).await;
        let fetch_failures = outcomes.iter().filter(|o| !o.is_materialized()).count();
        progress.fetched(outcomes.len() - fetch_failures, fetch_failures);

        // --- Documents ---
        progress.phase("Preparing documents");
        let units = self.processing_units(&outcomes).await;
        let label_images = self.label_images(&outcomes).await;

        progress.phase("Processing documents");
        let batch = BatchProcessor::new(self.batch.clone(), user);
        let accumulated = batch.process_all(&units, &self.service).await;

        // --- Classification ---
        progress.phase("Classifying records");
        let mut partials = self.classify(&items, user, &mut degraded).await;
        partials.extend(document_partials(&accumulated));
        partials.extend(self.extraction_partials(&items, &tags));

        // --- Merge ---
        progress.phase("Merging results");
        let meta = record_meta(request, &items, &tags, &outcomes, &label_images);
        let records = self.aggregator.merge(&request.global_ids, &meta, &partials);

        let outcome = EnrichmentOutcome {
            records,
            fetch_failures,
            chunk_failures: accumulated.failures.len(),
            degraded_sources: degraded,
            elapsed: start.elapsed(),
        };
        progress.done(&outcome);

        info!(
            records = outcome.records.len(),
            fetch_failures = outcome.fetch_failures,
            chunk_failures = outcome.chunk_failures,
            degraded = ?outcome.degraded_sources,
            elapsed_ms = outcome.elapsed.as_millis(),
            "enrichment complete"
        );

        Ok(outcome)
    }

    /// CDPH documents (with their rendered first page) then Hong Kong
    /// documents, each in request order.
    async fn processing_units(&self, outcomes: &[FetchOutcome]) -> Vec<ProcessingUnit> {
        let mut cdph = Vec::new();
        let mut hk = Vec::new();

        for outcome in outcomes {
            let Some(path) = outcome.path() else {
                continue;
            };
            let owner = &outcome.target.owner;
            match outcome.target.kind {
                ArtifactKind::CdphDocument => cdph.push(ProcessingUnit {
                    owner: owner.clone(),
                    primary: path.clone(),
                    secondary: self.page_image(path, owner).await,
                }),
                ArtifactKind::HongKongDocument => hk.push(ProcessingUnit {
                    owner: owner.clone(),
                    primary: path.clone(),
                    secondary: None,
                }),
                ArtifactKind::ProductImage | ArtifactKind::LabelDocument => {}
            }
        }

        debug!(cdph = cdph.len(), hk = hk.len(), "processing units built");
        cdph.extend(hk);
        cdph
    }

    async fn page_image(&self, pdf: &std::path::Path, owner: &GlobalId) -> Option<std::path::PathBuf> {
        let dest = self.layout.page_image(owner);
        if let Some(existing) = existing_artifact(&dest).await {
            return Some(existing);
        }
        let dir = self.layout.page_images_dir();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(%owner, error = %RecallBriefError::io(&dir, e), "cannot create page image directory");
            return None;
        }
        self.renderer.render_first_page(pdf, &dest).await
    }

    async fn label_images(&self, outcomes: &[FetchOutcome]) -> HashMap<GlobalId, Vec<String>> {
        let mut images: HashMap<GlobalId, Vec<String>> = HashMap::new();
        let dir = self.layout.images_dir();

        for outcome in outcomes {
            if outcome.target.kind != ArtifactKind::LabelDocument {
                continue;
            }
            let Some(path) = outcome.path() else {
                continue;
            };
            let owner = &outcome.target.owner;
            let extracted = self.renderer.extract_images(path, owner, &dir).await;
            debug!(%owner, images = extracted.len(), "label images extracted");
            images
                .entry(owner.clone())
                .or_default()
                .extend(extracted.iter().map(|p| p.display().to_string()));
        }

        images
    }

    async fn classify(
        &self,
        items: &[RawItem],
        user: &str,
        degraded: &mut Vec<String>,
    ) -> Vec<PartialResult> {
        if items.is_empty() {
            return Vec::new();
        }

        let inputs: Vec<ClassificationInput> = items
            .iter()
            .map(|item| ClassificationInput {
                global_id: item.global_id.clone(),
                content: ItemContent::new(item.content.as_str()).flat,
                publisher: item.publisher.clone(),
                title: item.title.clone(),
            })
            .collect();

        let outputs = match self
            .service
            .run_workflow(WorkflowRequest::classification(&inputs, user))
            .await
        {
            Ok(outputs) => outputs,
            Err(e) => {
                error!(error = %e, "classification workflow failed, its fields will default");
                degraded.push("classification".to_string());
                return Vec::new();
            }
        };

        CLASSIFICATION_OUTPUTS
            .iter()
            .map(|(list, key, field)| {
                PartialResult::new(Origin::Classification, *field, Scope::AllSources)
                    .with_entries(keyed_entries(&outputs, list, key))
            })
            .collect()
    }

    /// One partial per `(source, field)` the local rules produced.
    fn extraction_partials(
        &self,
        items: &[RawItem],
        tags: &HashMap<&GlobalId, SourceTag>,
    ) -> Vec<PartialResult> {
        let mut partials: Vec<PartialResult> = Vec::new();

        for item in items {
            let Some(tag) = tags.get(&item.global_id) else {
                continue;
            };
            let Some(fields) = self.extractors.extract(tag, &ItemContent::new(item.content.as_str()))
            else {
                continue;
            };

            let values = [
                (Field::Title, fields.title),
                (Field::Distribution, fields.distribution),
                (Field::RecallReason, fields.recall_reason),
            ];
            for (field, value) in values {
                let Some(value) = value else {
                    continue;
                };
                let scope = Scope::Only(tag.clone());
                let position = partials
                    .iter()
                    .position(|p| p.field == field && p.scope == scope);
                let partial = match position {
                    Some(i) => &mut partials[i],
                    None => {
                        partials.push(PartialResult::new(Origin::Extraction, field, scope));
                        let last = partials.len() - 1;
                        &mut partials[last]
                    }
                };
                partial.entries.push((item.global_id.clone(), value));
            }
        }

        debug!(partials = partials.len(), "extraction partials built");
        partials
    }
}

fn validate_request(request: &EnrichRequest) -> Result<()> {
    if request.global_ids.is_empty() {
        return Err(RecallBriefError::validation("request has no globalIds"));
    }
    let mut seen = HashSet::new();
    for gid in &request.global_ids {
        if gid.as_str().trim().is_empty() {
            return Err(RecallBriefError::validation("request contains an empty globalId"));
        }
        if !is_path_safe(gid.as_str()) {
            return Err(RecallBriefError::validation(format!(
                "globalId {gid:?} cannot be used in an artifact file name"
            )));
        }
        if !seen.insert(gid) {
            return Err(RecallBriefError::validation(format!("duplicate globalId {gid}")));
        }
    }
    Ok(())
}

/// Ids become file name components under the data directory.
fn is_path_safe(id: &str) -> bool {
    id != "."
        && !id.contains("..")
        && !id.chars().any(|c| matches!(c, '/' | '\\') || c.is_control())
}

/// Keep one item per requested id, ordered like the request.
fn in_request_order(ids: &[GlobalId], items: Vec<RawItem>) -> Vec<RawItem> {
    let mut by_id: HashMap<GlobalId, RawItem> = items
        .into_iter()
        .map(|item| (item.global_id.clone(), item))
        .collect();
    ids.iter().filter_map(|gid| by_id.remove(gid)).collect()
}

fn document_partials(accumulated: &AccumulatedOutputs) -> Vec<PartialResult> {
    DOCUMENT_OUTPUTS
        .iter()
        .map(|(list, key, field, tag)| {
            PartialResult::new(Origin::DocumentBatch, *field, Scope::Only(tag.clone()))
                .with_entries(accumulated.entries(list, key))
        })
        .collect()
}

/// Metadata for every requested id, including ids the lookup did not return.
fn record_meta(
    request: &EnrichRequest,
    items: &[RawItem],
    tags: &HashMap<&GlobalId, SourceTag>,
    outcomes: &[FetchOutcome],
    label_images: &HashMap<GlobalId, Vec<String>>,
) -> HashMap<GlobalId, RecordMeta> {
    let by_id: HashMap<&GlobalId, &RawItem> = items.iter().map(|i| (&i.global_id, i)).collect();

    request
        .global_ids
        .iter()
        .map(|gid| {
            let mut products: Vec<String> = outcomes
                .iter()
                .filter(|o| o.target.kind == ArtifactKind::ProductImage && &o.target.owner == gid)
                .filter_map(|o| o.path().map(|p| p.display().to_string()))
                .collect();
            for image in label_images.get(gid).into_iter().flatten() {
                if !products.contains(image) {
                    products.push(image.clone());
                }
            }

            let item = by_id.get(gid);
            let meta = RecordMeta {
                title: item.map(|i| i.title.clone()).unwrap_or_default(),
                url: item.map(|i| i.url.clone()).unwrap_or_default(),
                source: tags
                    .get(gid)
                    .cloned()
                    .unwrap_or_else(|| SourceTag::Other(String::new())),
                products,
            };
            (gid.clone(), meta)
        })
        .collect()
}
