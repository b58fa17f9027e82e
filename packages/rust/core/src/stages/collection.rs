use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use prospector_shared::{DiscoveryPort, Event, FailureKind, RawContact, Record, RecordKey, StageId};

use super::{Stage, guarded};
use crate::merge::dedup;
use crate::pipeline::ProgressReporter;
use crate::state::{PipelineState, StageOutput};

/// Entry stage: turns the discovery port's contacts into records.
pub struct CollectionStage {
    discovery: Arc<dyn DiscoveryPort>,
    page_timeout: Duration,
}

impl CollectionStage {
    /// `page_timeout` is the budget for one result page; a lookup of depth
    /// `n` may take up to `n` of them.
    pub fn new(discovery: Arc<dyn DiscoveryPort>, page_timeout: Duration) -> Self {
        Self {
            discovery,
            page_timeout,
        }
    }

    fn lookup_budget(&self, depth: u32) -> Duration {
        self.page_timeout.saturating_mul(depth.max(1))
    }
}

#[async_trait]
impl Stage for CollectionStage {
    fn id(&self) -> StageId {
        StageId::Collection
    }

    /// The whole batch is the input; there are no records yet.
    fn is_eligible(&self, _record: &Record) -> bool {
        true
    }

    #[instrument(skip_all, fields(domain = %state.config().domain))]
    async fn run(&self, state: &PipelineState, progress: &dyn ProgressReporter) -> StageOutput {
        let config = state.config();
        progress.stage(self.id(), 0);

        let port = Arc::clone(&self.discovery);
        let domain = config.domain.clone();
        let depth = config.depth();
        let budget = self.lookup_budget(depth);
        let contacts = match guarded(budget, async move {
            port.lookup(&domain, depth).await
        })
        .await
        {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(
                    error = %e,
                    budget_ms = budget.as_millis() as u64,
                    "discovery lookup failed"
                );
                return StageOutput::new(
                    Vec::new(),
                    vec![Event::port_failure(self.id(), None, &e)],
                );
            }
        };

        let mut events = Vec::new();
        let mut records = Vec::with_capacity(contacts.len());
        for contact in contacts {
            match to_record(contact) {
                Ok(record) => records.push(record),
                Err(detail) => {
                    debug!(%detail, "skipping discovered contact");
                    events.push(Event::failure(self.id(), None, FailureKind::Schema, detail));
                }
            }
        }

        let discovered = records.len();
        let records = dedup(&records);
        if !records.is_empty() {
            events.push(Event::success(
                self.id(),
                None,
                format!("discovered {} contacts at {}", records.len(), config.domain),
            ));
        }

        info!(
            discovered,
            unique = records.len(),
            skipped = events.iter().filter(|e| e.is_failure()).count(),
            "collection complete"
        );
        StageOutput::new(records, events)
    }
}

/// Map a raw contact onto a record tagged `discovery`.
fn to_record(contact: RawContact) -> std::result::Result<Record, String> {
    let key = RecordKey::parse(&contact.value)
        .map_err(|e| format!("discovered contact has no usable email: {e}"))?;

    let mut record = Record::new(key).with_source(StageId::Collection.tag());
    record.first_name = non_empty(contact.first_name);
    record.last_name = non_empty(contact.last_name);
    record.role = non_empty(contact.position);
    record.profile_url = non_empty(contact.linkedin);
    record.phone_number = non_empty(contact.phone_number);
    record.confidence = contact.confidence;
    Ok(record)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
