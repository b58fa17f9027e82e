//! Pipeline stages.
//!
//! A stage reads a [`PipelineState`] and returns a [`StageOutput`]: the
//! record set it forwards plus the events it emitted. Stages never mutate
//! the caller's records and never return an error; every port failure is
//! folded into a failure [`Event`](prospector_shared::Event).

mod collection;
mod enrichment;
mod scoring;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use prospector_shared::{PortError, Record, StageId};

use crate::pipeline::ProgressReporter;
use crate::state::{PipelineState, StageOutput};

pub use collection::CollectionStage;
pub use enrichment::EnrichmentStage;
pub use scoring::ScoringStage;

/// A batch transformation with an eligibility predicate.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Whether `record` is processed by this stage. Ineligible records pass
    /// through untouched (or are dropped, if the stage filters).
    fn is_eligible(&self, record: &Record) -> bool;

    async fn run(&self, state: &PipelineState, progress: &dyn ProgressReporter) -> StageOutput;
}

/// Run a port call on its own task under `limit`.
///
/// A port that panics or overruns degrades to a [`PortError`] instead of
/// taking the run down with it.
pub(crate) async fn guarded<T, F>(limit: Duration, call: F) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(call);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(PortError::transport(format!("port call aborted: {join}"))),
        Err(_) => {
            handle.abort();
            Err(PortError::Timeout(limit))
        }
    }
}

/// Timeout only, for calls already running on a worker task.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(PortError::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guarded_passes_results_through() {
        let ok = guarded(Duration::from_secs(1), async { Ok::<_, PortError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = guarded(Duration::from_secs(1), async {
            Err::<u32, _>(PortError::schema("bad"))
        })
        .await;
        assert_eq!(err, Err(PortError::schema("bad")));
    }

    #[tokio::test]
    async fn guarded_times_out() {
        let limit = Duration::from_millis(20);
        let result = guarded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PortError>(())
        })
        .await;
        assert_eq!(result, Err(PortError::Timeout(limit)));
    }

    #[tokio::test]
    async fn guarded_contains_panics() {
        let broken = true;
        let result = guarded(Duration::from_secs(1), async move {
            if broken {
                panic!("adapter bug");
            }
            Ok::<(), PortError>(())
        })
        .await;
        assert!(matches!(result, Err(PortError::Transport(msg)) if msg.contains("aborted")));
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let limit = Duration::from_millis(10);
        let result = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PortError>(())
        })
        .await;
        assert_eq!(result, Err(PortError::Timeout(limit)));
    }
}
