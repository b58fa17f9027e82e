//! Shared types, error model, capability ports, and configuration for Prospector.
//!
//! This crate is the foundation depended on by all other Prospector crates.
//! It provides:
//! - [`ProspectorError`] and [`PortError`]: the error taxonomy
//! - The data model ([`Record`], [`Event`], [`RunConfig`])
//! - Capability ports ([`DiscoveryPort`], [`EnrichmentPort`], [`ReasoningPort`])
//! - Configuration ([`AppConfig`], [`PipelineOptions`], config loading)

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, HunterConfig, OpenRouterConfig, PipelineOptions, RapidApiConfig,
    api_key_from_env, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_data_dir, validate_api_keys,
};
pub use error::{FailureKind, PortError, ProspectorError, Result};
pub use ports::{
    DiscoveryPort, EnrichmentPort, ProfileAnalysis, RawContact, RawProfile, ReasoningPort,
    SchemaDescriptor, ScoreMap, ScoreVerdict,
};
pub use types::{
    BundleKey, Confidence, Event, Outcome, Record, RecordKey, RunConfig, SourceTag, Sources,
    StageId, normalize_domain,
};
