//! Metadata source layer
//!
//! Each source exposes typed lookup capabilities: a source that can search
//! tracks returns a [`TrackLookup`], one that can search albums returns an
//! [`AlbumLookup`]. Callers never test for methods at runtime.
//!
//! The [`SourceRegistry`] is built once per run from configuration and keeps
//! the configured order, which is also the merge priority order.

pub mod jiosaavn;
pub mod youtube;

pub use jiosaavn::JioSaavnSource;
pub use youtube::YouTubeSource;

use async_trait::async_trait;
use metaimport_common::config::TomlConfig;
use metaimport_common::Metadata;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// One match returned by a source lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Name of the source that produced it
    pub source: String,
    /// Display label, "artist - title" or "artist - album"
    pub label: String,
    pub metadata: Metadata,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Source lookup errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("Failed to parse {provider} response: {message}")]
    Parse { provider: String, message: String },

    #[error("{0} requires an API key")]
    MissingApiKey(String),

    #[error("Unknown metadata source: {0}")]
    Unavailable(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Track search capability
#[async_trait]
pub trait TrackLookup: Send + Sync {
    async fn search_tracks(&self, query: &str, limit: usize) -> SourceResult<Vec<Candidate>>;
}

/// Album search capability
#[async_trait]
pub trait AlbumLookup: Send + Sync {
    async fn search_albums(&self, query: &str, limit: usize) -> SourceResult<Vec<Candidate>>;
}

/// A configured metadata source
pub trait MetadataSource: Send + Sync {
    /// Identifier used in configuration and as merge priority key
    fn name(&self) -> &str;

    /// Attribute names this source writes (e.g. `yt_album_id`)
    fn id_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn track_lookup(&self) -> Option<&dyn TrackLookup> {
        None
    }

    fn album_lookup(&self) -> Option<&dyn AlbumLookup> {
        None
    }
}

/// Build one source by identifier
pub fn build_source(name: &str, config: &TomlConfig) -> SourceResult<Box<dyn MetadataSource>> {
    match name {
        youtube::SOURCE_NAME => {
            let api_key = config
                .youtube
                .resolve_api_key()
                .ok_or_else(|| SourceError::MissingApiKey(name.to_string()))?;
            let source = YouTubeSource::new(api_key, config.youtube.base_url.clone())?;
            Ok(Box::new(source))
        }
        jiosaavn::SOURCE_NAME => {
            let source = JioSaavnSource::new(config.jiosaavn.base_url.clone())?;
            Ok(Box::new(source))
        }
        other => Err(SourceError::Unavailable(other.to_string())),
    }
}

/// Ordered set of sources for one run
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn MetadataSource>>,
}

impl SourceRegistry {
    /// Build sources in configured order.
    ///
    /// Unknown or unusable sources are logged and left out; duplicates keep
    /// their first position.
    pub fn from_config(config: &TomlConfig) -> Self {
        let mut registry = Self::default();

        for name in &config.metaimport.sources {
            if registry.contains(name) {
                tracing::warn!(source = %name, "Source listed twice, ignoring repeat");
                continue;
            }

            match build_source(name, config) {
                Ok(source) => registry.sources.push(source),
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Source unavailable, skipping");
                }
            }
        }

        tracing::debug!(sources = ?registry.names(), "Source registry built");
        registry
    }

    /// Registry over already-built sources, in the given order
    pub fn with_sources(sources: Vec<Box<dyn MetadataSource>>) -> Self {
        Self { sources }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn MetadataSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// Source names in priority order
    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Union of the attribute names declared by all sources
    pub fn declared_fields(&self) -> BTreeSet<String> {
        self.sources
            .iter()
            .flat_map(|s| s.id_fields().iter())
            .map(|f| f.to_string())
            .collect()
    }
}

/// Decode the HTML entities catalog APIs leave in titles
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(|c: char| c == 'x' || c == 'X') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}
