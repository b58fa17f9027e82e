//! Dedup/merge reducer for record sets produced at different times.
//!
//! One record per identity key. For a key present on both sides the older
//! record is overlaid with every non-null field of the newer one and the
//! provenance trails are unioned (see [`Record::overlay`]). Keys only present
//! in `new` are appended in their original order.

use std::collections::HashMap;

use prospector_shared::{Record, RecordKey};

/// Combine `old` and `new` into a single set keyed by identity.
///
/// Idempotent (`merge(s, s) == s` for a duplicate-free `s`) and associative
/// over an ordered sequence of batches.
pub fn merge(old: &[Record], new: &[Record]) -> Vec<Record> {
    let mut merged: Vec<Record> = Vec::with_capacity(old.len() + new.len());
    let mut index: HashMap<RecordKey, usize> = HashMap::with_capacity(old.len() + new.len());

    for record in old.iter().chain(new) {
        match index.get(record.key()) {
            Some(&pos) => {
                merged[pos] = merged[pos].clone().overlay(record);
            }
            None => {
                index.insert(record.key().clone(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
}

/// Fold a single batch onto itself, collapsing duplicate identities.
pub fn dedup(records: &[Record]) -> Vec<Record> {
    merge(&[], records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_shared::{BundleKey, SourceTag, StageId};

    fn record(email: &str) -> Record {
        Record::new(RecordKey::parse(email).unwrap())
    }

    /// Compare by identity + fields, ignoring order.
    fn sorted(mut records: Vec<Record>) -> Vec<Record> {
        records.sort_by(|a, b| a.key().cmp(b.key()));
        records
    }

    fn batch_a() -> Vec<Record> {
        let mut ada = record("ada@example.com").with_source(SourceTag::Discovery);
        ada.role = Some("CTO".into());
        let mut bob = record("bob@example.com").with_source(SourceTag::Discovery);
        bob.first_name = Some("Bob".into());
        vec![ada, bob]
    }

    fn batch_b() -> Vec<Record> {
        let ada = record("ada@example.com")
            .with_source(SourceTag::Discovery)
            .with_source(SourceTag::Scored)
            .with_score(0.9, "decision maker");
        let mut cy = record("cy@example.com").with_source(SourceTag::Discovery);
        cy.role = Some("CMO".into());
        vec![ada, cy]
    }

    fn batch_c() -> Vec<Record> {
        let mut ada = record("ada@example.com")
            .with_source(SourceTag::Enriched)
            .with_bundle(
                StageId::Enrichment,
                BundleKey::ProfileAnalysis,
                serde_json::json!({"seniority_level": "executive"}),
            )
            .unwrap();
        ada.role = Some("Chief Technology Officer".into());
        let bob = record("bob@example.com").with_score(0.3, "weak fit");
        vec![bob, ada]
    }

    #[test]
    fn new_only_identities_are_inserted() {
        let merged = merge(&batch_a(), &batch_b());
        let keys: Vec<_> = merged.iter().map(|r| r.key().as_str()).collect();
        assert_eq!(keys, ["ada@example.com", "bob@example.com", "cy@example.com"]);
    }

    #[test]
    fn overlapping_identity_overlays_and_unions() {
        let merged = merge(&batch_a(), &batch_b());
        let ada = &merged[0];
        assert_eq!(ada.role.as_deref(), Some("CTO"));
        assert_eq!(ada.score(), Some(0.9));
        assert_eq!(ada.sources().joined(), "discovery,scored");
    }

    #[test]
    fn null_incoming_fields_do_not_erase() {
        let merged = merge(&batch_a(), &[record("bob@example.com")]);
        assert_eq!(merged[1].first_name.as_deref(), Some("Bob"));
        assert!(merged[1].has_source(SourceTag::Discovery));
    }

    #[test]
    fn merge_is_idempotent() {
        for set in [batch_a(), batch_b(), batch_c(), merge(&batch_a(), &batch_c())] {
            assert_eq!(sorted(merge(&set, &set)), sorted(set.clone()));
        }
    }

    #[test]
    fn merge_is_associative() {
        let batches = [batch_a(), batch_b(), batch_c(), Vec::new()];
        for a in &batches {
            for b in &batches {
                for c in &batches {
                    let left = merge(&merge(a, b), c);
                    let right = merge(a, &merge(b, c));
                    assert_eq!(sorted(left), sorted(right));
                }
            }
        }
    }

    #[test]
    fn merge_keeps_identities_unique() {
        let merged = merge(&merge(&batch_a(), &batch_b()), &batch_c());
        let mut keys: Vec<_> = merged.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), merged.len());
    }

    #[test]
    fn score_is_not_replaced_by_later_batch() {
        let merged = merge(&batch_b(), &batch_c());
        assert_eq!(merged[0].score(), Some(0.9));
        assert_eq!(merged[0].score_reason(), Some("decision maker"));
    }

    #[test]
    fn dedup_folds_duplicates_within_a_batch() {
        let mut first = record("Ada@Example.com").with_source(SourceTag::Discovery);
        first.first_name = Some("Ada".into());
        let mut second = record("ada@example.com").with_source(SourceTag::Discovery);
        second.last_name = Some("Lovelace".into());

        let folded = dedup(&[first, second]);
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].display_name().as_deref(), Some("Ada Lovelace"));
    }
}
