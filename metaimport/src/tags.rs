//! Audio file tag writing with lofty
//!
//! Writes a record's current values into the file's primary tag, creating
//! the tag when the file has none. Blocking; async callers go through
//! [`write_tags_blocking`].

use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use metaimport_common::{FieldValue, Metadata};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fields mirrored into file tags
pub const TAG_FIELDS: &[&str] = &[
    "title",
    "artist",
    "album",
    "albumartist",
    "genre",
    "year",
    "track",
    "disc",
    "label",
];

#[derive(Error, Debug)]
pub enum TagWriteError {
    #[error("Tag error for {path}: {source}")]
    Lofty {
        path: String,
        #[source]
        source: LoftyError,
    },

    #[error("{0} does not support tags")]
    Unsupported(String),

    #[error("Tag writer task failed: {0}")]
    Task(String),
}

fn tag_number(value: &FieldValue) -> Option<u32> {
    let n = match value {
        FieldValue::Int(i) => *i,
        FieldValue::Text(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok()
}

/// Write the tag fields present in `values` to the file at `path`.
///
/// Returns the fields written; the file is left untouched when none apply.
pub fn write_tags(path: &Path, values: &Metadata) -> Result<Vec<&'static str>, TagWriteError> {
    let lofty_error = |source| TagWriteError::Lofty {
        path: path.display().to_string(),
        source,
    };

    let mut tagged_file = Probe::open(path)
        .map_err(lofty_error)?
        .read()
        .map_err(lofty_error)?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| TagWriteError::Unsupported(path.display().to_string()))?;

    let mut written = Vec::new();
    for &field in TAG_FIELDS {
        let Some(value) = values.get(field).filter(|v| !v.is_absent()) else {
            continue;
        };
        let text = value.to_string();

        let applied = match field {
            "title" => {
                tag.set_title(text);
                true
            }
            "artist" => {
                tag.set_artist(text);
                true
            }
            "album" => {
                tag.set_album(text);
                true
            }
            "genre" => {
                tag.set_genre(text);
                true
            }
            "albumartist" => tag.insert_text(ItemKey::AlbumArtist, text),
            "label" => tag.insert_text(ItemKey::Label, text),
            "year" => tag_number(value).map(|n| tag.set_year(n)).is_some(),
            "track" => tag_number(value).map(|n| tag.set_track(n)).is_some(),
            "disc" => tag_number(value).map(|n| tag.set_disk(n)).is_some(),
            _ => false,
        };

        if applied {
            written.push(field);
        } else {
            tracing::warn!(
                path = %path.display(),
                field = field,
                value = %value,
                "Value not representable in tag, skipping"
            );
        }
    }

    if !written.is_empty() {
        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(lofty_error)?;
        tracing::debug!(path = %path.display(), fields = ?written, "Tags written");
    }

    Ok(written)
}

/// [`write_tags`] on the blocking thread pool
pub async fn write_tags_blocking(
    path: PathBuf,
    values: Metadata,
) -> Result<Vec<&'static str>, TagWriteError> {
    tokio::task::spawn_blocking(move || write_tags(&path, &values))
        .await
        .map_err(|e| TagWriteError::Task(e.to_string()))?
}
