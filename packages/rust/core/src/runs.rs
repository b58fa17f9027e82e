//! Persisted runs: execute the pipeline and fold its output into the
//! materialized record set for the domain.
//!
//! Re-running a domain is safe. The stored set is merged with the fresh one
//! through [`merge`], so replaying a run never duplicates identities or loses
//! fields and provenance gathered earlier.

use tracing::{info, instrument, warn};

use prospector_shared::{Record, Result, RunConfig};
use prospector_storage::Storage;

use crate::merge::merge;
use crate::pipeline::{Pipeline, ProgressReporter, RunOutcome};

/// Result of [`run_and_persist`].
#[derive(Debug)]
pub struct PersistedRun {
    /// Storage id of the run.
    pub run_id: String,
    /// What this run produced on its own.
    pub outcome: RunOutcome,
    /// The domain's materialized set after merging this run in.
    pub merged: Vec<Record>,
}

/// Run the pipeline and persist the run, its events, and the merged record set.
#[instrument(skip_all, fields(domain = %config.domain))]
pub async fn run_and_persist(
    pipeline: &Pipeline,
    storage: &Storage,
    config: RunConfig,
    progress: &dyn ProgressReporter,
) -> Result<PersistedRun> {
    // Validate first so a bad config never creates a run row.
    let config = config.validate()?;

    let previous = storage.load_records(&config.domain).await?;
    let run_id = storage
        .insert_run(&config.domain, &config.target_role)
        .await?;
    info!(%run_id, previous = previous.len(), "run started");

    let recorded = record_run(pipeline, storage, &run_id, config, &previous, progress).await;
    let (outcome, merged) = match recorded {
        Ok(done) => done,
        Err(e) => {
            warn!(%run_id, error = %e, "run failed");
            let terminal = format!("failed: {e}");
            if let Err(finish) = storage.finish_run(&run_id, 0, 0, &terminal).await {
                warn!(%run_id, error = %finish, "could not mark run as failed");
            }
            return Err(e);
        }
    };

    info!(
        %run_id,
        fresh = outcome.records.len(),
        materialized = merged.len(),
        "run persisted"
    );
    Ok(PersistedRun {
        run_id,
        outcome,
        merged,
    })
}

/// Run the pipeline and write its results under `run_id`.
async fn record_run(
    pipeline: &Pipeline,
    storage: &Storage,
    run_id: &str,
    config: RunConfig,
    previous: &[Record],
    progress: &dyn ProgressReporter,
) -> Result<(RunOutcome, Vec<Record>)> {
    let outcome = pipeline.run(config, progress).await?;

    let merged = merge(previous, &outcome.records);
    storage
        .save_records(&outcome.config.domain, &merged)
        .await?;
    storage.append_events(run_id, &outcome.events).await?;
    storage
        .finish_run(
            run_id,
            outcome.records.len(),
            outcome.events.len(),
            outcome.terminal.describe(),
        )
        .await?;
    Ok((outcome, merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::pipeline::SilentProgress;
    use crate::testing::{FakeDiscovery, FakeEnrichment, FakeReasoning, contact, ports};
    use prospector_shared::{PipelineOptions, SourceTag};
    use uuid::Uuid;

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("prospector_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db_path()).await.expect("open test db")
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            concurrency: 2,
            port_timeout: Duration::from_secs(1),
            reasoning_timeout: Duration::from_secs(1),
            analysis_attempts: 1,
        }
    }

    fn pipeline(reasoning: FakeReasoning) -> Pipeline {
        let discovery = FakeDiscovery::with_contacts(vec![
            contact("a@example.com", Some("CTO"), Some("in/a")),
            contact("b@example.com", Some("CMO"), Some("in/b")),
        ]);
        let (ports, _) = ports(discovery, FakeEnrichment::new(), reasoning);
        Pipeline::new(ports, options())
    }

    #[tokio::test]
    async fn persists_run_events_and_records() {
        let storage = test_storage().await;
        let pipeline = pipeline(FakeReasoning::new().with_score("a@example.com", 0.9));

        let persisted = run_and_persist(
            &pipeline,
            &storage,
            RunConfig::new("Example.com", "CTO", 5),
            &SilentProgress,
        )
        .await
        .expect("run");

        let run = storage.get_run(&persisted.run_id).await.unwrap().unwrap();
        assert_eq!(run.domain, "example.com");
        assert_eq!(run.terminal.as_deref(), Some("pipeline completed"));
        assert_eq!(run.event_count, Some(persisted.outcome.events.len() as u64));

        let events = storage.list_events(&persisted.run_id).await.unwrap();
        assert_eq!(events.len(), persisted.outcome.events.len());

        let stored = storage.load_records("example.com").await.unwrap();
        assert_eq!(stored, persisted.merged);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].has_source(SourceTag::Enriched));
    }

    #[tokio::test]
    async fn repeated_runs_merge_into_materialized_set() {
        let storage = test_storage().await;

        // First run: scoring outage keeps both records, unscored.
        let outage = pipeline(
            FakeReasoning::new().failing_score(prospector_shared::PortError::transport("down")),
        );
        let first = run_and_persist(
            &outage,
            &storage,
            RunConfig::new("example.com", "CTO", 5),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(first.merged.len(), 2);

        // Second run selects only `a`; `b` must survive from the first run.
        let healthy = pipeline(FakeReasoning::new().with_score("a@example.com", 0.6));
        let second = run_and_persist(
            &healthy,
            &storage,
            RunConfig::new("example.com", "CTO", 5),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(second.outcome.records.len(), 1);
        assert_eq!(second.merged.len(), 2);
        let a = &second.merged[0];
        assert_eq!(a.sources().joined(), "discovery,scored,enriched");
        assert_eq!(a.score(), Some(0.6));
        assert_eq!(second.merged[1].sources().joined(), "discovery");

        // Replaying the same run leaves the materialized set unchanged.
        let replay = run_and_persist(
            &healthy,
            &storage,
            RunConfig::new("example.com", "CTO", 5),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(replay.merged.len(), 2);
        assert_eq!(replay.merged[0].score(), Some(0.6));
        assert_eq!(storage.list_runs(Some("example.com")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_config_creates_no_run() {
        let storage = test_storage().await;
        let pipeline = pipeline(FakeReasoning::new());

        let result = run_and_persist(
            &pipeline,
            &storage,
            RunConfig::new("example.com", "", 5),
            &SilentProgress,
        )
        .await;

        assert!(result.is_err());
        assert!(storage.list_runs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_closes_the_run_as_failed() {
        let path = temp_db_path();
        let storage = Storage::open(&path).await.expect("open test db");

        // A second connection installs a trigger that rejects every event row.
        let db = libsql::Builder::new_local(&path).build().await.unwrap();
        db.connect()
            .unwrap()
            .execute(
                "CREATE TRIGGER reject_events BEFORE INSERT ON events
                 BEGIN SELECT RAISE(ABORT, 'event log unavailable'); END",
                (),
            )
            .await
            .unwrap();

        let pipeline = pipeline(FakeReasoning::new().with_score("a@example.com", 0.9));
        let result = run_and_persist(
            &pipeline,
            &storage,
            RunConfig::new("example.com", "CTO", 5),
            &SilentProgress,
        )
        .await;

        assert!(result.is_err());
        let runs = storage.list_runs(Some("example.com")).await.unwrap();
        assert_eq!(runs.len(), 1);
        let terminal = runs[0].terminal.as_deref().expect("run was finished");
        assert!(terminal.starts_with("failed: "));
        assert!(terminal.contains("event log unavailable"));
        assert_eq!(runs[0].record_count, Some(0));
    }
}
