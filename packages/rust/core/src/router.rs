//! Routing between stages.
//!
//! The flow is a closed table of named rules. Each rule names the stage it
//! applies after, a halt predicate over the stage's output, and where to go
//! when the predicate does not fire. No counters, no clocks: [`decide`] is a
//! total function of the current record set and stage.

use prospector_shared::{Record, StageId};

/// The stage every run starts with.
pub const ENTRY: StageId = StageId::Collection;

/// What runs after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Advance(StageId),
    Terminal(TerminalReason),
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// Collection produced no records.
    NoRecords,
    /// Scoring left no record with a positive score.
    NoPositiveScore,
    /// The last stage ran.
    Completed,
}

impl TerminalReason {
    /// `true` when the run stopped because nothing was eligible to continue.
    pub fn is_exhaustion(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::NoRecords => "no records to route further",
            Self::NoPositiveScore => "no record has a positive score",
            Self::Completed => "pipeline completed",
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// One routing rule.
pub struct Rule {
    pub after: StageId,
    pub halt_when: fn(&[Record]) -> bool,
    pub halt: TerminalReason,
    /// `None` ends the run with [`TerminalReason::Completed`].
    pub next: Option<StageId>,
}

/// Predicates the routing table is built from.
pub mod predicates {
    use prospector_shared::Record;

    pub fn is_empty(records: &[Record]) -> bool {
        records.is_empty()
    }

    pub fn none_scored_positive(records: &[Record]) -> bool {
        !records.iter().any(Record::has_positive_score)
    }

    pub fn always(_: &[Record]) -> bool {
        true
    }
}

pub const RULES: &[Rule] = &[
    Rule {
        after: StageId::Collection,
        halt_when: predicates::is_empty,
        halt: TerminalReason::NoRecords,
        next: Some(StageId::Scoring),
    },
    Rule {
        after: StageId::Scoring,
        halt_when: predicates::none_scored_positive,
        halt: TerminalReason::NoPositiveScore,
        next: Some(StageId::Enrichment),
    },
    Rule {
        after: StageId::Enrichment,
        halt_when: predicates::always,
        halt: TerminalReason::Completed,
        next: None,
    },
];

/// Decide what follows `current` given the records it produced.
pub fn decide(records: &[Record], current: StageId) -> Decision {
    let Some(rule) = RULES.iter().find(|r| r.after == current) else {
        return Decision::Terminal(TerminalReason::Completed);
    };

    if (rule.halt_when)(records) {
        return Decision::Terminal(rule.halt);
    }
    match rule.next {
        Some(next) => Decision::Advance(next),
        None => Decision::Terminal(TerminalReason::Completed),
    }
}
