//! Change detection and application
//!
//! A `ChangeSet` is the minimal diff between a record's current values and the
//! merged proposal. It is computed without touching the record, then applied
//! field by field. A field that fails to write is logged and left out of the
//! applied set; the remaining fields are still written. Persisting the record
//! is the caller's job.

use metaimport_common::{FieldValue, Metadata};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use thiserror::Error;

/// Per-field write failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldWriteError {
    /// Value cannot be coerced to the field's column type
    #[error("cannot store {value:?} in {expected} field '{field}'")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        value: String,
    },

    /// Field is managed by the library and never written from metadata
    #[error("field '{0}' is read-only")]
    ReadOnly(String),
}

/// A library entity whose fields can be read and written by name
pub trait Record {
    /// Fields this record supports (fixed columns plus attributes it carries)
    fn known_fields(&self) -> BTreeSet<String>;

    /// Current value of one field, `None` when unset
    fn get(&self, field: &str) -> Option<FieldValue>;

    /// Set one field, coercing to the field's storage type
    fn set(&mut self, field: &str, value: FieldValue) -> Result<(), FieldWriteError>;

    /// Snapshot of all current values
    fn values(&self) -> Metadata;

    /// Value as it would be stored by [`Record::set`], so that proposals can
    /// be compared against stored values. Falls back to the raw value.
    fn normalize(&self, _field: &str, value: &FieldValue) -> FieldValue {
        value.clone()
    }
}

/// One proposed field change
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Current value, `None` when the record has no value
    pub current: Option<FieldValue>,
    pub new: FieldValue,
}

/// Field name → proposed change
pub type ChangeSet = BTreeMap<String, FieldChange>;

/// Diff merged metadata against a record's current values.
///
/// Fields outside `known_fields` are skipped; fields whose current value
/// already equals the proposal are skipped. A stored `Null` counts as no
/// value.
pub fn compute_changes(
    current: &Metadata,
    merged: &Metadata,
    known_fields: &BTreeSet<String>,
) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (field, new) in merged {
        if !known_fields.contains(field) {
            tracing::debug!(field = %field, "Field not supported by record, skipping");
            continue;
        }

        let existing = current.get(field).filter(|v| **v != FieldValue::Null);
        if existing == Some(new) {
            continue;
        }

        changes.insert(
            field.clone(),
            FieldChange {
                current: existing.cloned(),
                new: new.clone(),
            },
        );
    }

    changes
}

/// Apply a change set to a record, returning the fields actually written.
pub fn apply_changes<R: Record + ?Sized>(record: &mut R, changes: &ChangeSet) -> BTreeSet<String> {
    let mut applied = BTreeSet::new();

    for (field, change) in changes {
        match record.set(field, change.new.clone()) {
            Ok(()) => {
                applied.insert(field.clone());
            }
            Err(e) => {
                tracing::warn!(field = %field, error = %e, "Field write failed, skipping");
            }
        }
    }

    applied
}

/// Render a change set for display, one `field: old -> new` line per field
pub fn format_changes(heading: &str, changes: &ChangeSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heading);

    let width = changes.keys().map(|k| k.len()).max().unwrap_or(0);
    for (field, change) in changes {
        let old = change
            .current
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:<width$} {} -> {}",
            format!("{}:", field),
            old,
            change.new,
            width = width + 1
        );
    }

    out
}
