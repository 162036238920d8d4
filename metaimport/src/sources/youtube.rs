//! YouTube Data API v3 source
//!
//! Tracks are searched as videos, albums as playlists. Auto-generated artist
//! channels are named "<artist> - Topic"; the suffix is stripped.

use super::{
    decode_entities, AlbumLookup, Candidate, MetadataSource, SourceError, SourceResult,
    TrackLookup,
};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use metaimport_common::{FieldValue, Metadata};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;

pub const SOURCE_NAME: &str = "youtube";

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const REQUESTS_PER_SECOND: u32 = 5;
const TOPIC_SUFFIX: &str = " - Topic";
const ID_FIELDS: &[&str] = &["yt_track_id", "yt_album_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchKind {
    Video,
    Playlist,
}

impl SearchKind {
    fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Video => "video",
            SearchKind::Playlist => "playlist",
        }
    }
}

pub struct YouTubeSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl YouTubeSource {
    pub fn new(api_key: String, base_url: Option<String>) -> SourceResult<Self> {
        let rate = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate);

        let client = reqwest::Client::builder()
            .user_agent(concat!("metaimport/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: usize,
    ) -> SourceResult<Vec<Candidate>> {
        tracing::debug!(query = %query, kind = kind.as_str(), "Searching YouTube");

        self.rate_limiter.until_ready().await;

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let max_results = limit.clamp(1, 50).to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", kind.as_str()),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Http {
                provider: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let candidates = parse_search_response(&body, kind)?;

        tracing::debug!(count = candidates.len(), "YouTube candidates");
        Ok(candidates)
    }
}

impl MetadataSource for YouTubeSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn id_fields(&self) -> &'static [&'static str] {
        ID_FIELDS
    }

    fn track_lookup(&self) -> Option<&dyn TrackLookup> {
        Some(self)
    }

    fn album_lookup(&self) -> Option<&dyn AlbumLookup> {
        Some(self)
    }
}

#[async_trait]
impl TrackLookup for YouTubeSource {
    async fn search_tracks(&self, query: &str, limit: usize) -> SourceResult<Vec<Candidate>> {
        self.search(query, SearchKind::Video, limit).await
    }
}

#[async_trait]
impl AlbumLookup for YouTubeSource {
    async fn search_albums(&self, query: &str, limit: usize) -> SourceResult<Vec<Candidate>> {
        self.search(query, SearchKind::Playlist, limit).await
    }
}

fn parse_search_response(body: &Value, kind: SearchKind) -> SourceResult<Vec<Candidate>> {
    let items = body["items"].as_array().ok_or_else(|| SourceError::Parse {
        provider: SOURCE_NAME.to_string(),
        message: "missing items array".to_string(),
    })?;

    Ok(items.iter().filter_map(|item| parse_item(item, kind)).collect())
}

/// One search result. Items without an id of the requested kind are dropped.
fn parse_item(item: &Value, kind: SearchKind) -> Option<Candidate> {
    let id = match kind {
        SearchKind::Video => item["id"]["videoId"].as_str()?,
        SearchKind::Playlist => item["id"]["playlistId"].as_str()?,
    };

    let snippet = &item["snippet"];
    let title = decode_entities(snippet["title"].as_str().unwrap_or_default());
    let artist = snippet["channelTitle"]
        .as_str()
        .map(|channel| channel_artist(&decode_entities(channel)))
        .unwrap_or_default();

    let mut metadata = Metadata::new();
    match kind {
        SearchKind::Video => {
            metadata.insert("artist".to_string(), FieldValue::from(artist.clone()));
            metadata.insert("title".to_string(), FieldValue::from(title.clone()));
            metadata.insert("yt_track_id".to_string(), FieldValue::from(id));
        }
        SearchKind::Playlist => {
            metadata.insert("album".to_string(), FieldValue::from(title.clone()));
            metadata.insert("albumartist".to_string(), FieldValue::from(artist.clone()));
            metadata.insert("yt_album_id".to_string(), FieldValue::from(id));
        }
    }

    if let Some(year) = snippet["publishedAt"].as_str().and_then(published_year) {
        metadata.insert("year".to_string(), FieldValue::Int(year));
    }

    Some(Candidate {
        source: SOURCE_NAME.to_string(),
        label: format!("{} - {}", artist, title),
        metadata,
    })
}

fn channel_artist(channel: &str) -> String {
    channel
        .strip_suffix(TOPIC_SUFFIX)
        .unwrap_or(channel)
        .trim()
        .to_string()
}

fn published_year(published_at: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(published_at)
        .ok()
        .map(|dt| i64::from(dt.with_timezone(&Utc).year()))
}
