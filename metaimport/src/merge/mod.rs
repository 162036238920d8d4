//! Metadata merge resolver
//!
//! Combines the metadata gathered from several sources for one record into a
//! single mapping, then hands it to the change detector.
//!
//! **Priority:** sources are visited in configured order; the first present
//! value for a field wins and later sources only fill gaps.
//!
//! **Union:** distinct present values from all sources are kept. A field stays
//! scalar while only one distinct value has been seen and becomes a list (in
//! order of first appearance) once a second one arrives.
//!
//! Excluded fields are dropped before any other rule. Absent values (null,
//! blank text, empty list) never overwrite anything.

pub mod changes;

pub use changes::{
    apply_changes, compute_changes, format_changes, ChangeSet, FieldChange, FieldWriteError,
    Record,
};

use metaimport_common::{FieldValue, MergeStrategy, Metadata};
use std::collections::{BTreeSet, HashMap};

/// Merge per-source metadata for one record.
///
/// `sources` gives the priority order; sources missing from `per_source`
/// produced nothing and are skipped. Pure and deterministic.
pub fn merge(
    sources: &[String],
    per_source: &HashMap<String, Metadata>,
    exclusions: &BTreeSet<String>,
    strategy: MergeStrategy,
) -> Metadata {
    let mut merged = Metadata::new();

    for source in sources {
        let Some(raw) = per_source.get(source) else {
            continue;
        };

        for (field, value) in raw {
            if exclusions.contains(field) {
                continue;
            }
            let Some(value) = clean(value) else {
                continue;
            };

            match strategy {
                MergeStrategy::Priority => {
                    merged.entry(field.clone()).or_insert(value);
                }
                MergeStrategy::Union => match merged.get_mut(field) {
                    None => {
                        merged.insert(field.clone(), value);
                    }
                    Some(existing) => {
                        for contribution in value.contributions() {
                            absorb(existing, contribution);
                        }
                    }
                },
            }
        }
    }

    merged
}

/// Present, distinct contributions of one source value.
///
/// Absent list members are dropped and duplicates removed in order; a single
/// survivor collapses to a scalar. `None` when nothing present remains.
fn clean(value: &FieldValue) -> Option<FieldValue> {
    let mut kept: Vec<FieldValue> = Vec::new();
    for item in value.contributions() {
        if !item.is_absent() && !kept.contains(item) {
            kept.push(item.clone());
        }
    }

    match kept.len() {
        0 => None,
        1 => kept.pop(),
        _ => Some(FieldValue::List(kept)),
    }
}

/// Fold one contributed value into an already-set union field
fn absorb(existing: &mut FieldValue, incoming: &FieldValue) {
    if incoming.is_absent() {
        return;
    }

    match existing {
        FieldValue::List(items) => {
            if !items.contains(incoming) {
                items.push(incoming.clone());
            }
        }
        scalar => {
            if *scalar != *incoming {
                let old = std::mem::replace(scalar, FieldValue::Null);
                *scalar = FieldValue::List(vec![old, incoming.clone()]);
            }
        }
    }
}

/// Merge resolver bound to one run's configuration
///
/// Configuration (strategy, exclusions) is fixed for the duration of a run.
#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    strategy: MergeStrategy,
    exclusions: BTreeSet<String>,
}

impl MergeResolver {
    pub fn new(strategy: MergeStrategy, exclusions: BTreeSet<String>) -> Self {
        Self {
            strategy,
            exclusions,
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Merge per-source metadata under this resolver's strategy and exclusions
    pub fn merge(&self, sources: &[String], per_source: &HashMap<String, Metadata>) -> Metadata {
        let merged = merge(sources, per_source, &self.exclusions, self.strategy);

        tracing::debug!(
            strategy = %self.strategy,
            sources = per_source.len(),
            fields = merged.len(),
            "Metadata merged"
        );

        merged
    }

    /// Compute changes against a record snapshot, dropping excluded fields
    /// even if the caller built `merged` some other way.
    pub fn changes(
        &self,
        current: &Metadata,
        merged: &Metadata,
        known_fields: &BTreeSet<String>,
    ) -> ChangeSet {
        let mut changes = compute_changes(current, merged, known_fields);
        changes.retain(|field, _| !self.exclusions.contains(field));
        changes
    }
}
