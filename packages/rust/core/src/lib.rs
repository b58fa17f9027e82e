//! Core pipeline orchestration and domain logic for Prospector.
//!
//! This crate wires the collection, scoring, and enrichment stages together
//! through the routing table into the pipeline engine ([`Pipeline`]), and
//! provides the dedup/merge reducer, persisted runs, and the analysis cache.

pub mod cache;
pub mod merge;
pub mod pipeline;
pub mod router;
pub mod runs;
pub mod stages;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::CachedReasoning;
pub use merge::{dedup, merge};
pub use pipeline::{Pipeline, Ports, ProgressReporter, RunOutcome, SilentProgress};
pub use router::{Decision, TerminalReason, decide};
pub use runs::{PersistedRun, run_and_persist};
pub use stages::{CollectionStage, EnrichmentStage, ScoringStage, Stage};
pub use state::{PipelineState, StageOutput};
