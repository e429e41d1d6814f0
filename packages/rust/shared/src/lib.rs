//! Shared types, error model, and configuration for RecallBrief.
//!
//! This crate is the foundation depended on by all other RecallBrief crates.
//! It provides:
//! - [`RecallBriefError`]: the unified error type
//! - Domain types ([`Record`], [`FetchTarget`], [`PartialResult`], [`GlobalId`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], [`BatchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, BatchSection, CleanupSection, DEFAULT_PLACEHOLDER, DefaultsConfig,
    FetchConfig, FetchSection, PathsConfig, RenderSection, WorkflowSection, api_key_from_env,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_workflow,
};
pub use error::{RecallBriefError, Result};
pub use types::{
    ArtifactKind, EnrichRequest, FetchOutcome, FetchStatus, FetchTarget, Field, GlobalId, Origin,
    PartialResult, ProcessingUnit, RawItem, Record, Scope, SourceTag, UploadKind,
};
