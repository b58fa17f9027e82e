//! Analysis cache in front of a reasoning port.
//!
//! `analyze` answers are keyed by a SHA-256 hash of the prompt inputs plus the
//! model id and stored in the `analysis_cache` table. `score` depends on the
//! whole batch and always goes to the inner port.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use prospector_shared::{
    PortError, ProfileAnalysis, RawProfile, ReasoningPort, Record, SchemaDescriptor, ScoreMap,
};
use prospector_storage::Storage;

/// Reasoning port decorator serving repeated analyses from storage.
pub struct CachedReasoning {
    inner: Arc<dyn ReasoningPort>,
    storage: Arc<Storage>,
    model_id: String,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedReasoning {
    pub fn new(
        inner: Arc<dyn ReasoningPort>,
        storage: Arc<Storage>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            storage,
            model_id: model_id.into(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Number of analyses served from the cache.
    pub fn cache_hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of analyses that went to the model.
    pub fn cache_misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Compute a prompt hash for cache keying.
fn prompt_hash(profile: &RawProfile, role_description: &str, schema: &SchemaDescriptor) -> String {
    let mut hasher = Sha256::new();
    // `extra` is a sorted map, so equal profiles serialize to equal bytes.
    hasher.update(serde_json::to_vec(profile).unwrap_or_default());
    hasher.update(b"\0");
    hasher.update(role_description.as_bytes());
    hasher.update(b"\0");
    hasher.update(schema.name.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ReasoningPort for CachedReasoning {
    async fn score(
        &self,
        records: &[Record],
        role_description: &str,
        max_results: u32,
    ) -> Result<ScoreMap, PortError> {
        self.inner.score(records, role_description, max_results).await
    }

    async fn analyze(
        &self,
        profile: &RawProfile,
        role_description: &str,
        schema: &SchemaDescriptor,
    ) -> Result<ProfileAnalysis, PortError> {
        let hash = prompt_hash(profile, role_description, schema);

        match self.storage.get_analysis_cache(&hash, &self.model_id).await {
            Ok(Some(cached)) => match serde_json::from_str::<ProfileAnalysis>(&cached) {
                Ok(analysis) => {
                    debug!(hash = %&hash[..12], "analysis cache hit");
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(analysis);
                }
                Err(e) => warn!(error = %e, "discarding unreadable cached analysis"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "analysis cache read failed"),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let analysis = self.inner.analyze(profile, role_description, schema).await?;

        match serde_json::to_string(&analysis) {
            Ok(json) => {
                if let Err(e) = self
                    .storage
                    .set_analysis_cache(&hash, &self.model_id, &json)
                    .await
                {
                    warn!(error = %e, "analysis cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize analysis for cache"),
        }
        Ok(analysis)
    }
}
