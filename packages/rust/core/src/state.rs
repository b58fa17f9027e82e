//! The engine's working value and the delta a stage hands back.

use std::sync::Arc;

use prospector_shared::{Event, Record, RunConfig};

/// Records, event log, and run parameters at a stage boundary.
///
/// Never mutated in place: [`PipelineState::advance`] consumes the state and
/// returns the next one.
#[derive(Debug, Clone)]
pub struct PipelineState {
    records: Vec<Record>,
    events: Vec<Event>,
    config: Arc<RunConfig>,
}

impl PipelineState {
    /// Empty state for a (validated) run configuration.
    pub fn new(config: RunConfig) -> Self {
        Self {
            records: Vec::new(),
            events: Vec::new(),
            config: Arc::new(config),
        }
    }

    /// State seeded with records, e.g. to run a single stage in isolation.
    pub fn with_records(config: RunConfig, records: Vec<Record>) -> Self {
        Self {
            records,
            events: Vec::new(),
            config: Arc::new(config),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Shared handle to the run configuration for worker tasks.
    pub fn shared_config(&self) -> Arc<RunConfig> {
        Arc::clone(&self.config)
    }

    /// Replace the record set with the stage's output and append its events.
    pub fn advance(self, output: StageOutput) -> Self {
        let mut events = self.events;
        events.extend(output.events);
        Self {
            records: output.records,
            events,
            config: self.config,
        }
    }

    /// Append events without touching the record set.
    pub fn with_events(self, extra: impl IntoIterator<Item = Event>) -> Self {
        let mut events = self.events;
        events.extend(extra);
        Self { events, ..self }
    }

    pub fn into_parts(self) -> (Vec<Record>, Vec<Event>) {
        (self.records, self.events)
    }
}

/// What a stage produced: the forward record set plus the events it emitted.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub records: Vec<Record>,
    pub events: Vec<Event>,
}

impl StageOutput {
    pub fn new(records: Vec<Record>, events: Vec<Event>) -> Self {
        Self { records, events }
    }
}
