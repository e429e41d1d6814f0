//! Resilient artifact downloads for RecallBrief.
//!
//! This crate provides:
//! - [`retry`]: bounded retry with constant or linear backoff
//! - [`engine`]: bounded-concurrency fetcher with idempotent skip
//! - [`identity`]: rotating request identity headers
//! - [`layout`]: deterministic on-disk artifact paths
//! - [`sweep`]: retention-based cleanup of managed directories

pub mod engine;
pub mod identity;
pub mod layout;
pub mod retry;
pub mod sweep;

pub use engine::ConcurrentFetcher;
pub use identity::RequestIdentity;
pub use layout::{ArtifactLayout, existing_artifact, existing_image};
pub use retry::{Backoff, RetryPolicy};
pub use sweep::{ArtifactSweeper, SweepReport};
