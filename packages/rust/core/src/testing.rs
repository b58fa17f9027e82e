//! In-memory port fakes for stage and engine tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use prospector_shared::{
    DiscoveryPort, EnrichmentPort, PortError, ProfileAnalysis, RawContact, RawProfile,
    ReasoningPort, Record, RecordKey, SchemaDescriptor, ScoreMap, ScoreVerdict,
};

use crate::pipeline::Ports;

pub(crate) fn contact(email: &str, role: Option<&str>, linkedin: Option<&str>) -> RawContact {
    RawContact {
        value: email.to_string(),
        first_name: Some("Test".into()),
        position: role.map(String::from),
        linkedin: linkedin.map(String::from),
        ..Default::default()
    }
}

/// Shared handles to the fakes behind a [`Ports`] value, for call assertions.
pub(crate) struct Handles {
    pub discovery: Arc<FakeDiscovery>,
    pub enrichment: Arc<FakeEnrichment>,
    pub reasoning: Arc<FakeReasoning>,
}

pub(crate) fn ports(
    discovery: FakeDiscovery,
    enrichment: FakeEnrichment,
    reasoning: FakeReasoning,
) -> (Ports, Handles) {
    let handles = Handles {
        discovery: Arc::new(discovery),
        enrichment: Arc::new(enrichment),
        reasoning: Arc::new(reasoning),
    };
    let ports = Ports {
        discovery: handles.discovery.clone(),
        enrichment: handles.enrichment.clone(),
        reasoning: handles.reasoning.clone(),
    };
    (ports, handles)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

pub(crate) struct FakeDiscovery {
    result: Result<Vec<RawContact>, PortError>,
    delay: Option<Duration>,
    page_delay: Option<Duration>,
    calls: AtomicUsize,
    last: Mutex<Option<(String, u32)>>,
}

impl FakeDiscovery {
    pub fn with_contacts(contacts: Vec<RawContact>) -> Self {
        Self {
            result: Ok(contacts),
            delay: None,
            page_delay: None,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn failing(error: PortError) -> Self {
        Self {
            result: Err(error),
            ..Self::with_contacts(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep `delay` once per requested page, like a paging adapter.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    pub fn lookup_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_domain(&self) -> Option<String> {
        self.last.lock().unwrap().as_ref().map(|(d, _)| d.clone())
    }

    pub fn last_depth(&self) -> Option<u32> {
        self.last.lock().unwrap().as_ref().map(|(_, depth)| *depth)
    }
}

#[async_trait]
impl DiscoveryPort for FakeDiscovery {
    async fn lookup(&self, domain: &str, depth: u32) -> Result<Vec<RawContact>, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((domain.to_string(), depth));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(delay) = self.page_delay {
            for _ in 0..depth.max(1) {
                tokio::time::sleep(delay).await;
            }
        }
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Returns a profile whose `public_identifier` is the requested reference.
pub(crate) struct FakeEnrichment {
    failures: HashMap<String, PortError>,
    slow: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl FakeEnrichment {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            slow: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, profile_ref: &str, error: PortError) -> Self {
        self.failures.insert(profile_ref.to_string(), error);
        self
    }

    pub fn slow(mut self, profile_ref: &str, delay: Duration) -> Self {
        self.slow.insert(profile_ref.to_string(), delay);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentPort for FakeEnrichment {
    async fn fetch(&self, profile_ref: &str) -> Result<RawProfile, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.slow.get(profile_ref) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(profile_ref) {
            return Err(error.clone());
        }
        Ok(RawProfile {
            full_name: Some(format!("Profile {profile_ref}")),
            headline: Some("Engineering leader".into()),
            public_identifier: Some(profile_ref.to_string()),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

pub(crate) struct FakeReasoning {
    scores: HashMap<String, f64>,
    score_failure: Option<PortError>,
    analyze_failures: usize,
    analyze_failing_refs: HashMap<String, PortError>,
    analyze_delay: Option<Duration>,
    score_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
    last_batch: AtomicUsize,
}

impl FakeReasoning {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            score_failure: None,
            analyze_failures: 0,
            analyze_failing_refs: HashMap::new(),
            analyze_delay: None,
            score_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            last_batch: AtomicUsize::new(0),
        }
    }

    /// Select `email` with `score` when it appears in a scoring batch.
    pub fn with_score(mut self, email: &str, score: f64) -> Self {
        self.scores.insert(email.to_lowercase(), score);
        self
    }

    pub fn failing_score(mut self, error: PortError) -> Self {
        self.score_failure = Some(error);
        self
    }

    /// Fail the first `n` analyze calls with a schema error.
    pub fn failing_analyze_first(mut self, n: usize) -> Self {
        self.analyze_failures = n;
        self
    }

    /// Always fail analysis of the profile fetched for `profile_ref`.
    pub fn failing_analyze_for(mut self, profile_ref: &str, error: PortError) -> Self {
        self.analyze_failing_refs.insert(profile_ref.to_string(), error);
        self
    }

    pub fn with_analyze_delay(mut self, delay: Duration) -> Self {
        self.analyze_delay = Some(delay);
        self
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn last_score_batch(&self) -> usize {
        self.last_batch.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningPort for FakeReasoning {
    async fn score(
        &self,
        records: &[Record],
        _role_description: &str,
        _max_results: u32,
    ) -> Result<ScoreMap, PortError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.last_batch.store(records.len(), Ordering::SeqCst);
        if let Some(error) = &self.score_failure {
            return Err(error.clone());
        }
        Ok(records
            .iter()
            .filter_map(|r| {
                self.scores.get(r.key().as_str()).map(|score| {
                    (
                        RecordKey::clone(r.key()),
                        ScoreVerdict {
                            score: *score,
                            reason: format!("fit for role ({score})"),
                        },
                    )
                })
            })
            .collect())
    }

    async fn analyze(
        &self,
        profile: &RawProfile,
        _role_description: &str,
        _schema: &SchemaDescriptor,
    ) -> Result<ProfileAnalysis, PortError> {
        let n = self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.analyze_delay {
            tokio::time::sleep(delay).await;
        }
        if n < self.analyze_failures {
            return Err(PortError::schema("answer is not valid JSON"));
        }
        let failing = profile
            .public_identifier
            .as_deref()
            .and_then(|id| self.analyze_failing_refs.get(id));
        if let Some(error) = failing {
            return Err(error.clone());
        }
        Ok(ProfileAnalysis {
            full_name: profile.full_name.clone(),
            headline: profile.headline.clone(),
            seniority_level: Some("executive".into()),
            role_relevance: Some(0.8),
            ..Default::default()
        })
    }
}
