use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use prospector_shared::{
    BundleKey, EnrichmentPort, Event, FailureKind, PipelineOptions, PortError, ProfileAnalysis,
    ReasoningPort, Record, RunConfig, StageId,
};

use super::{Stage, bounded};
use crate::merge::merge;
use crate::pipeline::ProgressReporter;
use crate::state::{PipelineState, StageOutput};

/// Per-record profile fetch and analysis over a bounded worker pool.
///
/// The terminal record set is the input set with the successful records
/// upgraded; everything else passes through as it was.
pub struct EnrichmentStage {
    worker: Worker,
    concurrency: usize,
}

impl EnrichmentStage {
    /// Fetches run under `port_timeout`, each analysis attempt under
    /// `reasoning_timeout`.
    pub fn new(
        enrichment: Arc<dyn EnrichmentPort>,
        reasoning: Arc<dyn ReasoningPort>,
        options: &PipelineOptions,
    ) -> Self {
        Self {
            worker: Worker {
                enrichment,
                reasoning,
                fetch_timeout: options.port_timeout,
                analyze_timeout: options.reasoning_timeout,
                attempts: options.analysis_attempts.max(1),
            },
            concurrency: options.concurrency.max(1),
        }
    }
}

#[async_trait]
impl Stage for EnrichmentStage {
    fn id(&self) -> StageId {
        StageId::Enrichment
    }

    fn is_eligible(&self, record: &Record) -> bool {
        record.has_source(StageId::Scoring.tag())
            && record.has_positive_score()
            && record
                .profile_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }

    #[instrument(skip_all, fields(records = state.records().len(), concurrency = self.concurrency))]
    async fn run(&self, state: &PipelineState, progress: &dyn ProgressReporter) -> StageOutput {
        let eligible: Vec<Record> = state
            .records()
            .iter()
            .filter(|r| self.is_eligible(r))
            .cloned()
            .collect();
        progress.stage(self.id(), eligible.len());

        if eligible.is_empty() {
            info!("no records eligible for enrichment");
            return StageOutput::new(
                state.records().to_vec(),
                vec![Event::info(
                    self.id(),
                    "no scored records with a profile reference to enrich",
                )],
            );
        }

        // Workers hand back results; nothing shared is mutated while they run.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(eligible.len());
        for record in eligible {
            let key = record.key().clone();
            let sem = Arc::clone(&semaphore);
            let worker = self.worker.clone();
            let config = state.shared_config();
            handles.push((
                key,
                tokio::spawn(async move {
                    let _permit = sem.acquire().await.map_err(|e| {
                        RecordFailure::new(Phase::Fetch, PortError::transport(e.to_string()))
                    })?;
                    worker.enrich(record, &config).await
                }),
            ));
        }

        let total = handles.len();
        let mut upgraded = Vec::with_capacity(total);
        let mut events = Vec::with_capacity(total);
        for (done, (key, handle)) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(record)) => {
                    debug!(%key, "enriched");
                    events.push(Event::success(self.id(), Some(key.clone()), "profile enriched"));
                    upgraded.push(record);
                }
                Ok(Err(failure)) => {
                    warn!(%key, error = %failure, "enrichment failed");
                    events.push(Event::failure(
                        self.id(),
                        Some(key.clone()),
                        failure.error.kind(),
                        failure.to_string(),
                    ));
                }
                Err(join) => {
                    warn!(%key, error = %join, "enrichment worker aborted");
                    events.push(Event::failure(
                        self.id(),
                        Some(key.clone()),
                        FailureKind::Transport,
                        format!("worker aborted: {join}"),
                    ));
                }
            }
            progress.record_done(self.id(), &key, done + 1, total);
        }

        info!(
            eligible = total,
            enriched = upgraded.len(),
            failed = total - upgraded.len(),
            "enrichment complete"
        );
        StageOutput::new(merge(state.records(), &upgraded), events)
    }
}

// ---------------------------------------------------------------------------
// Per-record work
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Worker {
    enrichment: Arc<dyn EnrichmentPort>,
    reasoning: Arc<dyn ReasoningPort>,
    fetch_timeout: Duration,
    analyze_timeout: Duration,
    attempts: u32,
}

impl Worker {
    /// Fetch, analyze, and attach. Either both payloads land or the record
    /// is left untouched.
    async fn enrich(&self, record: Record, config: &RunConfig) -> Result<Record, RecordFailure> {
        let profile_ref = record.profile_url.clone().unwrap_or_default();
        let profile = bounded(self.fetch_timeout, self.enrichment.fetch(&profile_ref))
            .await
            .map_err(|e| RecordFailure::new(Phase::Fetch, e))?;

        let schema = ProfileAnalysis::schema();
        let mut attempt = 1;
        let analysis = loop {
            let result = bounded(
                self.analyze_timeout,
                self.reasoning
                    .analyze(&profile, &config.target_role, &schema),
            )
            .await;
            match result {
                Ok(analysis) => break analysis,
                Err(e) if attempt < self.attempts => {
                    debug!(key = %record.key(), attempt, error = %e, "analysis failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RecordFailure::new(Phase::Analyze { attempts: attempt }, e));
                }
            }
        };

        let raw = to_payload(&profile)?;
        let analysis = to_payload(&analysis)?;
        let stage = StageId::Enrichment;
        let record = record
            .with_bundle(stage, BundleKey::ProfileRaw, raw)
            .and_then(|r| r.with_bundle(stage, BundleKey::ProfileAnalysis, analysis))
            .map_err(|e| RecordFailure::new(Phase::Attach, PortError::schema(e.to_string())))?;
        Ok(record.with_source(stage.tag()))
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RecordFailure> {
    serde_json::to_value(value)
        .map_err(|e| RecordFailure::new(Phase::Attach, PortError::schema(e.to_string())))
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Fetch,
    Analyze { attempts: u32 },
    Attach,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => f.write_str("profile fetch"),
            Self::Analyze { attempts: 1 } => f.write_str("profile analysis"),
            Self::Analyze { attempts } => write!(f, "profile analysis ({attempts} attempts)"),
            Self::Attach => f.write_str("attach payload"),
        }
    }
}

#[derive(Debug)]
struct RecordFailure {
    phase: Phase,
    error: PortError,
}

impl RecordFailure {
    fn new(phase: Phase, error: PortError) -> Self {
        Self { phase, error }
    }
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.phase, self.error)
    }
}
