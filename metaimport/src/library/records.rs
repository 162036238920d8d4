//! In-memory library records
//!
//! Items and albums share one representation: typed fixed columns plus
//! free-form attributes (source identifiers such as `yt_album_id`). Writes go
//! through [`Record::set`], which coerces fixed columns and marks the field
//! dirty so that [`super::store::store_record`] only touches what changed.

use super::fields::{coerce, FieldDef, ALBUM_FIELDS, ITEM_FIELDS, READ_ONLY_FIELDS};
use crate::merge::{FieldWriteError, Record};
use metaimport_common::{FieldValue, Metadata};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Item,
    Album,
}

impl RecordKind {
    pub fn fields(&self) -> &'static [FieldDef] {
        match self {
            RecordKind::Item => ITEM_FIELDS,
            RecordKind::Album => ALBUM_FIELDS,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Item => "items",
            RecordKind::Album => "albums",
        }
    }

    pub fn attribute_table(&self) -> &'static str {
        match self {
            RecordKind::Item => "item_attributes",
            RecordKind::Album => "album_attributes",
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields().iter().find(|d| d.name == name)
    }
}

/// One item or album row with its attributes
#[derive(Debug, Clone)]
pub struct LibraryRecord {
    pub kind: RecordKind,
    /// Row id, 0 until inserted
    pub id: i64,
    /// Owning album (items only)
    pub album_id: Option<i64>,
    /// Audio file path (items only)
    pub path: Option<PathBuf>,
    pub(crate) fields: Metadata,
    pub(crate) attributes: Metadata,
    pub(crate) dirty: BTreeSet<String>,
}

impl LibraryRecord {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            id: 0,
            album_id: None,
            path: None,
            fields: Metadata::new(),
            attributes: Metadata::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn new_item(path: impl Into<PathBuf>) -> Self {
        let mut item = Self::new(RecordKind::Item);
        item.path = Some(path.into());
        item
    }

    pub fn new_album() -> Self {
        Self::new(RecordKind::Album)
    }

    /// Builder-style setter for seeding records. Values that fail coercion
    /// are logged and dropped.
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        if let Err(e) = self.set(field, value.into()) {
            tracing::warn!(field = %field, error = %e, "Ignoring invalid seed value");
        }
        self
    }

    /// Text rendering of a field, empty when unset
    pub fn text(&self, field: &str) -> String {
        self.get(field).map(|v| v.to_string()).unwrap_or_default()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_fields(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// Query string for source lookups: the given fields joined with a
    /// space, blank parts dropped.
    pub fn query_string(&self, parts: &[&str]) -> String {
        parts
            .iter()
            .map(|field| self.text(field))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Human-readable heading: "artist - title" or "albumartist - album"
    pub fn heading(&self) -> String {
        match self.kind {
            RecordKind::Item => format!("{} - {}", self.text("artist"), self.text("title")),
            RecordKind::Album => {
                format!("{} - {}", self.text("albumartist"), self.text("album"))
            }
        }
    }
}

impl Record for LibraryRecord {
    fn known_fields(&self) -> BTreeSet<String> {
        self.kind
            .fields()
            .iter()
            .map(|d| d.name.to_string())
            .chain(self.attributes.keys().cloned())
            .collect()
    }

    fn get(&self, field: &str) -> Option<FieldValue> {
        self.fields
            .get(field)
            .or_else(|| self.attributes.get(field))
            .filter(|v| **v != FieldValue::Null)
            .cloned()
    }

    fn set(&mut self, field: &str, value: FieldValue) -> Result<(), FieldWriteError> {
        if READ_ONLY_FIELDS.contains(&field) {
            return Err(FieldWriteError::ReadOnly(field.to_string()));
        }

        match self.kind.field(field) {
            Some(def) => {
                let stored = coerce(def, &value)?;
                self.fields.insert(field.to_string(), stored);
            }
            None => {
                self.attributes.insert(field.to_string(), value);
            }
        }

        self.dirty.insert(field.to_string());
        Ok(())
    }

    fn values(&self) -> Metadata {
        self.fields
            .iter()
            .chain(self.attributes.iter())
            .filter(|(_, v)| **v != FieldValue::Null)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn normalize(&self, field: &str, value: &FieldValue) -> FieldValue {
        match self.kind.field(field) {
            Some(def) => coerce(def, value).unwrap_or_else(|_| value.clone()),
            None => value.clone(),
        }
    }
}
