//! Pipeline engine: collection → scoring → enrichment, routed by the rule table.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use prospector_shared::{
    DiscoveryPort, EnrichmentPort, Event, PipelineOptions, ReasoningPort, Record, RecordKey,
    Result, RunConfig, SourceTag, StageId,
};

use crate::router::{self, Decision, TerminalReason};
use crate::stages::{CollectionStage, EnrichmentStage, ScoringStage, Stage};
use crate::state::PipelineState;

/// The capability ports a pipeline is constructed with.
#[derive(Clone)]
pub struct Ports {
    pub discovery: Arc<dyn DiscoveryPort>,
    pub enrichment: Arc<dyn EnrichmentPort>,
    pub reasoning: Arc<dyn ReasoningPort>,
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The validated configuration the run used.
    pub config: RunConfig,
    pub records: Vec<Record>,
    pub events: Vec<Event>,
    /// Stages that executed, in order.
    pub stages_run: Vec<StageId>,
    pub terminal: TerminalReason,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Records that made it all the way through enrichment.
    pub fn enriched_records(&self) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.has_source(SourceTag::Enriched))
            .cloned()
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_failure()).count()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts, with the number of records it will process.
    fn stage(&self, stage: StageId, eligible: usize);
    /// Called after each per-record unit of work.
    fn record_done(&self, stage: StageId, key: &RecordKey, current: usize, total: usize);
    /// Called when the run reaches a terminal state.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: StageId, _eligible: usize) {}
    fn record_done(&self, _stage: StageId, _key: &RecordKey, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

/// Stages wired to one set of ports. Construct once, run many times.
pub struct Pipeline {
    collection: CollectionStage,
    scoring: ScoringStage,
    enrichment: EnrichmentStage,
}

impl Pipeline {
    pub fn new(ports: Ports, options: PipelineOptions) -> Self {
        Self {
            collection: CollectionStage::new(ports.discovery, options.port_timeout),
            scoring: ScoringStage::new(Arc::clone(&ports.reasoning), options.reasoning_timeout),
            enrichment: EnrichmentStage::new(ports.enrichment, ports.reasoning, &options),
        }
    }

    fn stage(&self, id: StageId) -> &dyn Stage {
        match id {
            StageId::Collection => &self.collection,
            StageId::Scoring => &self.scoring,
            StageId::Enrichment => &self.enrichment,
        }
    }

    /// Execute one run.
    ///
    /// The only error is an invalid run configuration, raised before any
    /// stage starts. Port failures end up in the event log.
    #[instrument(skip_all, fields(domain = %config.domain, role = %config.target_role))]
    pub async fn run(
        &self,
        config: RunConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let config = config.validate()?;
        let start = Instant::now();
        info!(domain = %config.domain, max_results = config.max_results, "starting pipeline");

        let mut state = PipelineState::new(config.clone());
        let mut stages_run = Vec::new();
        let mut current = router::ENTRY;

        let terminal = loop {
            let output = self.stage(current).run(&state, progress).await;
            state = state.advance(output);
            stages_run.push(current);

            match router::decide(state.records(), current) {
                Decision::Advance(next) => {
                    info!(
                        from = %current,
                        to = %next,
                        records = state.records().len(),
                        "advancing"
                    );
                    current = next;
                }
                Decision::Terminal(reason) => {
                    if reason.is_exhaustion() {
                        state = state.with_events([Event::info(current, reason.describe())]);
                    }
                    break reason;
                }
            }
        };

        let (records, events) = state.into_parts();
        let outcome = RunOutcome {
            config,
            records,
            events,
            stages_run,
            terminal,
            elapsed: start.elapsed(),
        };

        info!(
            terminal = %outcome.terminal,
            records = outcome.records.len(),
            enriched = outcome.enriched_records().len(),
            failures = outcome.failure_count(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "pipeline complete"
        );
        progress.done(&outcome);
        Ok(outcome)
    }
}
