//! Fixed library columns and value coercion

use crate::merge::FieldWriteError;
use metaimport_common::FieldValue;
use std::fmt;

/// Storage type of a fixed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fixed column
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn def(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind }
}

/// Fixed item (track) columns that metadata may write
pub const ITEM_FIELDS: &[FieldDef] = &[
    def("title", FieldKind::Text),
    def("artist", FieldKind::Text),
    def("albumartist", FieldKind::Text),
    def("album", FieldKind::Text),
    def("year", FieldKind::Integer),
    def("track", FieldKind::Integer),
    def("disc", FieldKind::Integer),
    def("genre", FieldKind::Text),
    def("label", FieldKind::Text),
    def("language", FieldKind::Text),
    def("length", FieldKind::Real),
];

/// Fixed album columns that metadata may write
pub const ALBUM_FIELDS: &[FieldDef] = &[
    def("album", FieldKind::Text),
    def("albumartist", FieldKind::Text),
    def("year", FieldKind::Integer),
    def("genre", FieldKind::Text),
    def("label", FieldKind::Text),
    def("language", FieldKind::Text),
];

/// Columns managed by the library itself
pub const READ_ONLY_FIELDS: &[&str] = &["id", "album_id", "path"];

/// Separator used when a multi-valued field lands in a text column
pub const LIST_SEPARATOR: &str = "; ";

/// Coerce a value to a column's storage type
pub fn coerce(def: &FieldDef, value: &FieldValue) -> Result<FieldValue, FieldWriteError> {
    let mismatch = || FieldWriteError::TypeMismatch {
        field: def.name.to_string(),
        expected: def.kind.as_str(),
        value: value.to_string(),
    };

    match (def.kind, value) {
        (_, FieldValue::Null) => Ok(FieldValue::Null),

        (FieldKind::Text, FieldValue::Text(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldKind::Text, FieldValue::List(items)) => Ok(FieldValue::Text(
            items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        )),
        (FieldKind::Text, other) => Ok(FieldValue::Text(other.to_string())),

        (FieldKind::Integer, FieldValue::Int(i)) => Ok(FieldValue::Int(*i)),
        (FieldKind::Integer, FieldValue::Float(f)) if f.is_finite() && f.fract() == 0.0 => {
            Ok(FieldValue::Int(*f as i64))
        }
        (FieldKind::Integer, FieldValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| mismatch()),

        (FieldKind::Real, FieldValue::Float(f)) => Ok(FieldValue::Float(*f)),
        (FieldKind::Real, FieldValue::Int(i)) => Ok(FieldValue::Float(*i as f64)),
        (FieldKind::Real, FieldValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|_| mismatch()),

        _ => Err(mismatch()),
    }
}
