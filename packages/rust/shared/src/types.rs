//! Core domain types: records, provenance tags, events, and run parameters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FailureKind, PortError, ProspectorError, Result};

// ---------------------------------------------------------------------------
// RecordKey
// ---------------------------------------------------------------------------

/// Identity of a record: a trimmed, lower-cased email address.
///
/// Normalization happens on construction and on deserialization, so two keys
/// compare equal exactly when they denote the same contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey(String);

impl RecordKey {
    /// Normalize and validate a raw email address.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ProspectorError::validation("identity key is empty"));
        }
        if !normalized.contains('@') || normalized.chars().any(char::is_whitespace) {
            return Err(ProspectorError::validation(format!(
                "identity key '{normalized}' is not an email address"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecordKey {
    type Error = ProspectorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RecordKey {
    type Err = ProspectorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Stages and provenance tags
// ---------------------------------------------------------------------------

/// The stages of the enrichment pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Collection,
    Scoring,
    Enrichment,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Scoring => "scoring",
            Self::Enrichment => "enrichment",
        }
    }

    /// The provenance tag a record gains when this stage succeeds for it.
    pub fn tag(&self) -> SourceTag {
        match self {
            Self::Collection => SourceTag::Discovery,
            Self::Scoring => SourceTag::Scored,
            Self::Enrichment => SourceTag::Enriched,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageId {
    type Err = ProspectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "collection" => Ok(Self::Collection),
            "scoring" => Ok(Self::Scoring),
            "enrichment" => Ok(Self::Enrichment),
            other => Err(ProspectorError::parse(format!("unknown stage '{other}'"))),
        }
    }
}

/// Provenance marker recorded in [`Record::sources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Discovery,
    Scored,
    Enriched,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Scored => "scored",
            Self::Enriched => "enriched",
        }
    }
}

/// Insertion-ordered set of provenance tags. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SourceTag>", into = "Vec<SourceTag>")]
pub struct Sources(Vec<SourceTag>);

impl Sources {
    /// Add a tag. Returns `false` if it was already present.
    pub fn insert(&mut self, tag: SourceTag) -> bool {
        if self.contains(tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn contains(&self, tag: SourceTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceTag> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags of `self` followed by the tags of `other` not already present.
    pub fn union(&self, other: &Sources) -> Sources {
        let mut merged = self.clone();
        for tag in other.iter() {
            merged.insert(tag);
        }
        merged
    }

    /// Comma-separated rendering, e.g. `discovery,scored`.
    pub fn joined(&self) -> String {
        self.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",")
    }
}

impl From<Vec<SourceTag>> for Sources {
    fn from(tags: Vec<SourceTag>) -> Self {
        let mut sources = Sources::default();
        for tag in tags {
            sources.insert(tag);
        }
        sources
    }
}

impl From<Sources> for Vec<SourceTag> {
    fn from(sources: Sources) -> Self {
        sources.0
    }
}

// ---------------------------------------------------------------------------
// Enrichment bundle
// ---------------------------------------------------------------------------

/// Named analysis payloads a record can carry. Each key is owned by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKey {
    /// The raw external profile as returned by the enrichment port.
    ProfileRaw,
    /// The structured analysis of that profile.
    ProfileAnalysis,
}

impl BundleKey {
    /// The only stage allowed to set or overwrite this payload.
    pub fn owner(&self) -> StageId {
        match self {
            Self::ProfileRaw | Self::ProfileAnalysis => StageId::Enrichment,
        }
    }
}

/// Source-reported confidence: some providers give a number, some a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Confidence {
    Score(f64),
    Label(String),
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Score(v) => write!(f, "{v}"),
            Self::Label(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One subject of enrichment.
///
/// Updates are functional: every `with_*` method consumes the value and
/// returns the updated record. The identity key cannot be changed, the
/// provenance trail only grows, the score is write-once, and bundle payloads
/// can only be written by the stage that owns their key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: RecordKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    sources: Sources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score_reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    enrichment: BTreeMap<BundleKey, serde_json::Value>,
}

impl Record {
    /// A bare record with only its identity.
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            first_name: None,
            last_name: None,
            role: None,
            profile_url: None,
            phone_number: None,
            confidence: None,
            sources: Sources::default(),
            score: None,
            score_reason: None,
            enrichment: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn score_reason(&self) -> Option<&str> {
        self.score_reason.as_deref()
    }

    pub fn bundle(&self, key: BundleKey) -> Option<&serde_json::Value> {
        self.enrichment.get(&key)
    }

    pub fn bundle_entries(&self) -> impl Iterator<Item = (BundleKey, &serde_json::Value)> {
        self.enrichment.iter().map(|(k, v)| (*k, v))
    }

    /// Display name assembled from the optional name fields.
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(n), None) | (None, Some(n)) => Some(n.to_string()),
            (None, None) => None,
        }
    }

    pub fn has_role(&self) -> bool {
        self.role.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn has_positive_score(&self) -> bool {
        self.score.is_some_and(|s| s > 0.0)
    }

    pub fn has_source(&self, tag: SourceTag) -> bool {
        self.sources.contains(tag)
    }

    /// Append a provenance tag (no-op if already present).
    pub fn with_source(mut self, tag: SourceTag) -> Self {
        self.sources.insert(tag);
        self
    }

    /// Union the provenance trail with another one.
    pub fn with_sources(mut self, other: &Sources) -> Self {
        self.sources = self.sources.union(other);
        self
    }

    /// Set score and reason unless the record has already been scored.
    pub fn with_score(mut self, score: f64, reason: impl Into<String>) -> Self {
        if self.score.is_none() {
            self.score = Some(score);
            self.score_reason = Some(reason.into());
        }
        self
    }

    /// Attach a bundle payload on behalf of `stage`.
    ///
    /// Fails when `stage` does not own `key`.
    pub fn with_bundle(
        mut self,
        stage: StageId,
        key: BundleKey,
        payload: serde_json::Value,
    ) -> Result<Self> {
        if key.owner() != stage {
            return Err(ProspectorError::validation(format!(
                "stage '{stage}' cannot write bundle entry {key:?} owned by '{}'",
                key.owner()
            )));
        }
        self.enrichment.insert(key, payload);
        Ok(self)
    }

    /// Field-level overlay used by the merge reducer.
    ///
    /// Every non-null attribute of `newer` replaces ours, sources are unioned,
    /// bundle entries are overlaid per key, and the score stays with whichever
    /// side set it first.
    pub fn overlay(mut self, newer: &Record) -> Self {
        debug_assert_eq!(self.key, newer.key);
        overlay_field(&mut self.first_name, &newer.first_name);
        overlay_field(&mut self.last_name, &newer.last_name);
        overlay_field(&mut self.role, &newer.role);
        overlay_field(&mut self.profile_url, &newer.profile_url);
        overlay_field(&mut self.phone_number, &newer.phone_number);
        overlay_field(&mut self.confidence, &newer.confidence);
        self.sources = self.sources.union(&newer.sources);
        if self.score.is_none() && newer.score.is_some() {
            self.score = newer.score;
            self.score_reason = newer.score_reason.clone();
        }
        for (key, payload) in &newer.enrichment {
            self.enrichment.insert(*key, payload.clone());
        }
        self
    }
}

fn overlay_field<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *target = Some(value.clone());
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Outcome recorded on an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    /// Informational, e.g. a stage short-circuit or routing exhaustion.
    Info,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Info => "info",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = ProspectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "info" => Ok(Self::Info),
            other => Err(ProspectorError::parse(format!("unknown outcome '{other}'"))),
        }
    }
}

/// Immutable entry of the run's append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub stage: StageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<RecordKey>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl Event {
    fn new(
        stage: StageId,
        subject: Option<RecordKey>,
        outcome: Outcome,
        failure: Option<FailureKind>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            subject,
            outcome,
            failure,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    pub fn success(stage: StageId, subject: Option<RecordKey>, detail: impl Into<String>) -> Self {
        Self::new(stage, subject, Outcome::Success, None, detail)
    }

    pub fn info(stage: StageId, detail: impl Into<String>) -> Self {
        Self::new(stage, None, Outcome::Info, None, detail)
    }

    /// Failure event for a port error; the detail names the error kind.
    pub fn port_failure(stage: StageId, subject: Option<RecordKey>, error: &PortError) -> Self {
        Self::new(
            stage,
            subject,
            Outcome::Failure,
            Some(error.kind()),
            error.to_string(),
        )
    }

    pub fn failure(
        stage: StageId,
        subject: Option<RecordKey>,
        kind: FailureKind,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(stage, subject, Outcome::Failure, Some(kind), detail)
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Caller-supplied parameters of one run. Shared read-only by every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Target company domain, e.g. `example.com`.
    pub domain: String,
    /// Description of the role the run is prospecting for.
    pub target_role: String,
    /// Upper bound on how many records scoring may forward.
    pub max_results: u32,
    /// Pages of discovery results to look up (defaults to 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_depth: Option<u32>,
}

impl RunConfig {
    pub fn new(
        domain: impl Into<String>,
        target_role: impl Into<String>,
        max_results: u32,
    ) -> Self {
        Self {
            domain: domain.into(),
            target_role: target_role.into(),
            max_results,
            search_depth: None,
        }
    }

    pub fn with_search_depth(mut self, depth: u32) -> Self {
        self.search_depth = Some(depth);
        self
    }

    /// Effective discovery depth.
    pub fn depth(&self) -> u32 {
        self.search_depth.unwrap_or(1)
    }

    /// Check required parameters and return the normalized configuration.
    pub fn validate(self) -> Result<Self> {
        let domain = normalize_domain(&self.domain)?;
        if self.target_role.trim().is_empty() {
            return Err(ProspectorError::config("target_role is required"));
        }
        if self.max_results == 0 {
            return Err(ProspectorError::config("max_results must be at least 1"));
        }
        if self.search_depth == Some(0) {
            return Err(ProspectorError::config("search_depth must be at least 1"));
        }
        Ok(Self {
            domain,
            target_role: self.target_role.trim().to_string(),
            ..self
        })
    }
}

/// Reduce user input like `https://www.Example.com/about` to `example.com`.
pub fn normalize_domain(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProspectorError::config("domain is required"));
    }

    let host = if trimmed.contains("://") {
        let url = Url::parse(trimmed)
            .map_err(|e| ProspectorError::config(format!("invalid domain '{trimmed}': {e}")))?;
        url.host_str()
            .ok_or_else(|| ProspectorError::config(format!("domain '{trimmed}' has no host")))?
            .to_string()
    } else {
        trimmed.split('/').next().unwrap_or(trimmed).to_string()
    };

    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() || !host.contains('.') || host.chars().any(char::is_whitespace) {
        return Err(ProspectorError::config(format!("invalid domain '{trimmed}'")));
    }
    Ok(host.to_string())
}
