//! Field value model shared by sources, the merge resolver and the library store
//!
//! A source returns one `Metadata` map per candidate record. Values are
//! loosely typed (providers disagree on whether a year is a number or a
//! string), so coercion to a column type happens only when a value is written
//! to a library record.

use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field name → value mapping for one record.
///
/// Ordered so that display, iteration and comparison are deterministic.
pub type Metadata = BTreeMap<String, FieldValue>;

/// Single metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit "no value"
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Multi-valued field (e.g. several genres contributed by different sources)
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Whether this value carries no information.
    ///
    /// `Null`, blank text and empty lists are absent. Numeric zero and
    /// `false` are real values and count as present.
    pub fn is_absent(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Int(_) | FieldValue::Float(_) => false,
        }
    }

    /// Individual contributions carried by this value: the elements of a
    /// list, or the value itself for scalars.
    pub fn contributions(&self) -> &[FieldValue] {
        match self {
            FieldValue::List(items) => items,
            scalar => std::slice::from_ref(scalar),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// How values for the same field from several sources are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// First source (in configured order) with a value wins
    #[default]
    Priority,
    /// Distinct values from all sources are collected into a list
    Union,
}

impl MergeStrategy {
    /// Parse a strategy name, falling back to `Priority` for anything
    /// unrecognized.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "priority" => MergeStrategy::Priority,
            "union" => MergeStrategy::Union,
            other => {
                tracing::warn!(
                    strategy = %other,
                    "Unknown merge strategy, falling back to priority"
                );
                MergeStrategy::Priority
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Priority => "priority",
            MergeStrategy::Union => "union",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(MergeStrategy::from_name(s))
    }
}

impl Serialize for MergeStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Accepts any config value; names go through [`MergeStrategy::from_name`],
/// anything else falls back to priority.
struct StrategyVisitor;

impl StrategyVisitor {
    fn fallback(found: &str) -> MergeStrategy {
        tracing::warn!(
            found = %found,
            "Merge strategy is not a name, falling back to priority"
        );
        MergeStrategy::Priority
    }
}

impl<'de> Visitor<'de> for StrategyVisitor {
    type Value = MergeStrategy;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a merge strategy name")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(MergeStrategy::from_name(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
        Ok(Self::fallback(&v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(Self::fallback(&v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(Self::fallback(&v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(Self::fallback(&v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(Self::fallback("null"))
    }

    fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Self::fallback("array"))
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(Self::fallback("table"))
    }
}

impl<'de> Deserialize<'de> for MergeStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(StrategyVisitor)
    }
}
