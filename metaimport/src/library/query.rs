//! Library query terms
//!
//! `field:value` matches a substring of one fixed column; a bare word matches
//! a substring of any of the record's default search columns. All terms are
//! ANDed.

use super::records::RecordKind;
use metaimport_common::{Error, Result};

/// One query term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTerm {
    Field { name: String, pattern: String },
    Any(String),
}

/// Parsed library query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryQuery {
    pub terms: Vec<QueryTerm>,
}

impl LibraryQuery {
    /// Match every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse command-line query arguments
    pub fn parse(args: &[String]) -> Self {
        let terms = args
            .iter()
            .map(|arg| arg.trim())
            .filter(|arg| !arg.is_empty())
            .map(|arg| match arg.split_once(':') {
                Some((name, pattern)) if !name.is_empty() => QueryTerm::Field {
                    name: name.to_ascii_lowercase(),
                    pattern: pattern.to_string(),
                },
                _ => QueryTerm::Any(arg.to_string()),
            })
            .collect();

        Self { terms }
    }

    /// Build the WHERE clause and its bind parameters for one record kind.
    ///
    /// Column names come only from the fixed field tables; unknown field
    /// names are rejected.
    pub fn to_sql(&self, kind: RecordKind) -> Result<(String, Vec<String>)> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for term in &self.terms {
            match term {
                QueryTerm::Field { name, pattern } => {
                    let def = kind.field(name).ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "Unknown {} field in query: {}",
                            kind.table(),
                            name
                        ))
                    })?;
                    clauses.push(format!("CAST({} AS TEXT) LIKE ? ESCAPE '\\'", def.name));
                    params.push(like_pattern(pattern));
                }
                QueryTerm::Any(word) => {
                    let columns = default_columns(kind);
                    let any = columns
                        .iter()
                        .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
                        .collect::<Vec<_>>()
                        .join(" OR ");
                    clauses.push(format!("({})", any));
                    for _ in columns {
                        params.push(like_pattern(word));
                    }
                }
            }
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        Ok((sql, params))
    }
}

fn default_columns(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Item => &["artist", "album", "title"],
        RecordKind::Album => &["albumartist", "album"],
    }
}

/// Substring pattern with LIKE wildcards in `pattern` matched literally
fn like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('%');
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
