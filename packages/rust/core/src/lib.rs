//! Enrichment orchestration and domain logic for RecallBrief.
//!
//! This crate ties record lookup, artifact fetching, the remote document and
//! classification workflows, local extraction and result merging into one
//! end-to-end run (see [`pipeline::EnrichmentOrchestrator`]).

pub mod aggregate;
pub mod batch;
pub mod pipeline;
pub mod plan;
pub mod records;
pub mod remote;
pub mod render;
pub mod report;

pub use aggregate::{RecordMeta, ResultAggregator, post_process};
pub use batch::{AccumulatedOutputs, BatchProcessor, ChunkOperation};
pub use pipeline::{EnrichmentOrchestrator, EnrichmentOutcome, ProgressReporter, SilentProgress};
pub use plan::{DocumentRules, TargetPlanner};
pub use records::{HttpRecordSource, RecordSource, StaticRecordSource};
pub use remote::{RemoteService, Workflow, WorkflowClient, WorkflowRequest, WorkflowSettings};
pub use render::{DocumentRenderer, NoRenderer, PdfRenderer};
pub use report::ReportWriter;
