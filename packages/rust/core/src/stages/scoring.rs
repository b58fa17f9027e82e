use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use prospector_shared::{Event, FailureKind, ReasoningPort, Record, StageId};

use super::{Stage, guarded};
use crate::pipeline::ProgressReporter;
use crate::state::{PipelineState, StageOutput};

/// One aggregate reasoning call that picks and scores the records worth
/// pursuing. Only records the port selects move forward.
pub struct ScoringStage {
    reasoning: Arc<dyn ReasoningPort>,
    timeout: Duration,
}

impl ScoringStage {
    pub fn new(reasoning: Arc<dyn ReasoningPort>, timeout: Duration) -> Self {
        Self { reasoning, timeout }
    }
}

#[async_trait]
impl Stage for ScoringStage {
    fn id(&self) -> StageId {
        StageId::Scoring
    }

    fn is_eligible(&self, record: &Record) -> bool {
        record.has_role()
    }

    #[instrument(skip_all, fields(records = state.records().len()))]
    async fn run(&self, state: &PipelineState, progress: &dyn ProgressReporter) -> StageOutput {
        let config = state.config();
        let eligible: Vec<Record> = state
            .records()
            .iter()
            .filter(|r| self.is_eligible(r))
            .cloned()
            .collect();
        let eligible_count = eligible.len();
        progress.stage(self.id(), eligible_count);

        if eligible.is_empty() {
            info!("no records with a role, skipping scoring");
            return StageOutput::new(
                Vec::new(),
                vec![Event::info(self.id(), "no records with a role to score")],
            );
        }

        let port = Arc::clone(&self.reasoning);
        let batch = eligible.clone();
        let role = config.target_role.clone();
        let max_results = config.max_results;
        let verdicts = match guarded(self.timeout, async move {
            port.score(&batch, &role, max_results).await
        })
        .await
        {
            Ok(verdicts) => verdicts,
            Err(e) => {
                // Fail closed: keep every record, unscored.
                warn!(error = %e, "scoring call failed, passing records through");
                return StageOutput::new(
                    state.records().to_vec(),
                    vec![Event::port_failure(self.id(), None, &e)],
                );
            }
        };

        let mut selected = Vec::new();
        let mut events = Vec::new();
        for record in eligible {
            let Some(verdict) = verdicts.get(record.key()) else {
                debug!(key = %record.key(), "not selected by scoring");
                continue;
            };
            if !verdict.score.is_finite() || !(0.0..=1.0).contains(&verdict.score) {
                warn!(key = %record.key(), score = verdict.score, "score out of range");
                events.push(Event::failure(
                    self.id(),
                    Some(record.key().clone()),
                    FailureKind::Schema,
                    format!("score {} is outside [0, 1]", verdict.score),
                ));
                selected.push(record);
                continue;
            }
            let record = record
                .with_score(verdict.score, verdict.reason.clone())
                .with_source(self.id().tag());
            events.push(Event::success(
                self.id(),
                Some(record.key().clone()),
                format!("scored {:.2}", record.score().unwrap_or(verdict.score)),
            ));
            selected.push(record);
        }

        let cap = config.max_results as usize;
        if selected.len() > cap {
            selected.sort_by(|a, b| {
                b.score()
                    .unwrap_or(f64::MIN)
                    .total_cmp(&a.score().unwrap_or(f64::MIN))
            });
            selected.truncate(cap);
        }

        info!(
            eligible = eligible_count,
            selected = selected.len(),
            "scoring complete"
        );
        StageOutput::new(selected, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::FakeReasoning;
    use prospector_shared::{PortError, RecordKey, RunConfig, SourceTag};

    fn record(email: &str, role: Option<&str>) -> Record {
        let mut r = Record::new(RecordKey::parse(email).unwrap()).with_source(SourceTag::Discovery);
        r.role = role.map(String::from);
        r
    }

    fn state(max_results: u32, records: Vec<Record>) -> PipelineState {
        PipelineState::with_records(RunConfig::new("example.com", "CTO", max_results), records)
    }

    fn stage(reasoning: Arc<FakeReasoning>) -> ScoringStage {
        ScoringStage::new(reasoning, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn scores_selected_and_drops_the_rest() {
        let reasoning = Arc::new(
            FakeReasoning::new()
                .with_score("a@example.com", 0.9)
                .with_score("b@example.com", 0.4),
        );
        let input = state(
            5,
            vec![
                record("a@example.com", Some("CTO")),
                record("b@example.com", Some("VP Eng")),
                record("c@example.com", Some("Intern")),
                record("d@example.com", None),
            ],
        );

        let out = stage(reasoning.clone()).run(&input, &SilentProgress).await;

        let keys: Vec<_> = out.records.iter().map(|r| r.key().as_str()).collect();
        assert_eq!(keys, ["a@example.com", "b@example.com"]);
        assert!(out.records.iter().all(|r| r.sources().joined() == "discovery,scored"));
        assert_eq!(out.records[0].score(), Some(0.9));
        assert_eq!(out.events.len(), 2);
        assert_eq!(reasoning.score_calls(), 1);
        // Only roled records reach the port.
        assert_eq!(reasoning.last_score_batch(), 3);
    }

    #[tokio::test]
    async fn no_roled_records_short_circuits() {
        let reasoning = Arc::new(FakeReasoning::new());
        let input = state(
            5,
            vec![record("a@example.com", None), record("b@example.com", Some(" "))],
        );

        let out = stage(reasoning.clone()).run(&input, &SilentProgress).await;

        assert!(out.records.is_empty());
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].outcome, prospector_shared::Outcome::Info);
        assert_eq!(reasoning.score_calls(), 0);
    }

    #[tokio::test]
    async fn outage_passes_records_through_unscored() {
        let reasoning =
            Arc::new(FakeReasoning::new().failing_score(PortError::transport("503 upstream")));
        let input = state(
            5,
            vec![record("a@example.com", Some("CTO")), record("b@example.com", Some("CMO"))],
        );

        let out = stage(reasoning).run(&input, &SilentProgress).await;

        assert_eq!(out.records, input.records());
        assert!(out.records.iter().all(|r| !r.has_source(SourceTag::Scored)));
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].failure, Some(FailureKind::Transport));
    }

    #[tokio::test]
    async fn caps_forwarded_records_at_max_results() {
        let reasoning = Arc::new(
            FakeReasoning::new()
                .with_score("a@example.com", 0.2)
                .with_score("b@example.com", 0.8)
                .with_score("c@example.com", 0.5),
        );
        let input = state(
            2,
            vec![
                record("a@example.com", Some("CTO")),
                record("b@example.com", Some("CMO")),
                record("c@example.com", Some("CFO")),
            ],
        );

        let out = stage(reasoning).run(&input, &SilentProgress).await;

        let keys: Vec<_> = out.records.iter().map(|r| r.key().as_str()).collect();
        assert_eq!(keys, ["b@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn existing_score_is_never_overwritten() {
        let reasoning = Arc::new(FakeReasoning::new().with_score("a@example.com", 0.1));
        let prior = record("a@example.com", Some("CTO")).with_score(0.75, "earlier run");
        let input = state(5, vec![prior]);

        let out = stage(reasoning).run(&input, &SilentProgress).await;

        assert_eq!(out.records[0].score(), Some(0.75));
        assert_eq!(out.records[0].score_reason(), Some("earlier run"));
    }

    #[tokio::test]
    async fn out_of_range_verdict_is_a_schema_failure_for_that_record() {
        let reasoning = Arc::new(
            FakeReasoning::new()
                .with_score("a@example.com", 1.7)
                .with_score("b@example.com", 0.6),
        );
        let input = state(
            5,
            vec![record("a@example.com", Some("CTO")), record("b@example.com", Some("CMO"))],
        );

        let out = stage(reasoning).run(&input, &SilentProgress).await;

        assert_eq!(out.records.len(), 2);
        assert!(out.records[0].score().is_none());
        assert!(!out.records[0].has_source(SourceTag::Scored));
        assert_eq!(out.records[1].score(), Some(0.6));
        let failure = out.events.iter().find(|e| e.is_failure()).unwrap();
        assert_eq!(failure.failure, Some(FailureKind::Schema));
        assert_eq!(failure.subject.as_ref().unwrap().as_str(), "a@example.com");
    }
}
