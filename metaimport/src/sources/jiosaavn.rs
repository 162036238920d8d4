//! JioSaavn web API source

use super::{
    decode_entities, AlbumLookup, Candidate, MetadataSource, SourceError, SourceResult,
    TrackLookup,
};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use metaimport_common::{FieldValue, Metadata};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;

pub const SOURCE_NAME: &str = "jiosaavn";

const DEFAULT_BASE_URL: &str = "https://www.jiosaavn.com/api.php";
const REQUESTS_PER_SECOND: u32 = 2;
const ID_FIELDS: &[&str] = &["saavn_track_id", "saavn_album_id"];

const TRACK_CALL: &str = "search.getResults";
const ALBUM_CALL: &str = "search.getAlbumResults";

pub struct JioSaavnSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl JioSaavnSource {
    pub fn new(base_url: Option<String>) -> SourceResult<Self> {
        let rate = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);

        let client = reqwest::Client::builder()
            .user_agent(concat!("metaimport/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    async fn call(&self, call: &str, query: &str, limit: usize) -> SourceResult<Value> {
        tracing::debug!(call = %call, query = %query, "Searching JioSaavn");

        self.rate_limiter.until_ready().await;

        let count = limit.max(1).to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("__call", call),
                ("_format", "json"),
                ("_marker", "0"),
                ("api_version", "4"),
                ("ctx", "web6dot0"),
                ("q", query),
                ("p", "1"),
                ("n", count.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Http {
                provider: SOURCE_NAME.to_string(),
                status: response.status().as_u16(),
            });
        }

        // The endpoint answers with a text/html content type
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| SourceError::Parse {
            provider: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })
    }
}

impl MetadataSource for JioSaavnSource {
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
impl TrackLookup for JioSaavnSource {
    async fn search_tracks(&self, query: &str, limit: usize) -> SourceResult<Vec<Candidate>> {
        let body = self.call(TRACK_CALL, query, limit).await?;
        let candidates = parse_results(&body, parse_track)?;
        tracing::debug!(count = candidates.len(), "JioSaavn track candidates");
        Ok(candidates)
    }
}

#[async_trait]
impl AlbumLookup for JioSaavnSource {
    async fn search_albums(&self, query: &str, limit: usize) -> SourceResult<Vec<Candidate>> {
        let body = self.call(ALBUM_CALL, query, limit).await?;
        let candidates = parse_results(&body, parse_album)?;
        tracing::debug!(count = candidates.len(), "JioSaavn album candidates");
        Ok(candidates)
    }
}

fn parse_results(
    body: &Value,
    parse: fn(&Value) -> Option<Candidate>,
) -> SourceResult<Vec<Candidate>> {
    match &body["results"] {
        Value::Array(results) => Ok(results.iter().filter_map(parse).collect()),
        // No matches come back as an empty object
        Value::Null | Value::Object(_) => Ok(Vec::new()),
        other => Err(SourceError::Parse {
            provider: SOURCE_NAME.to_string(),
            message: format!("unexpected results value: {}", other),
        }),
    }
}

/// String field that may arrive as a JSON string or number
fn text(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let decoded = decode_entities(raw.trim());
    (!decoded.is_empty()).then_some(decoded)
}

fn integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn primary_artists(result: &Value) -> Option<String> {
    let names: Vec<String> = result["more_info"]["artistMap"]["primary_artists"]
        .as_array()
        .map(|artists| artists.iter().filter_map(|a| text(&a["name"])).collect())
        .unwrap_or_default();

    if names.is_empty() {
        text(&result["more_info"]["music"])
    } else {
        Some(names.join(", "))
    }
}

fn insert_opt(metadata: &mut Metadata, field: &str, value: Option<impl Into<FieldValue>>) {
    if let Some(value) = value {
        metadata.insert(field.to_string(), value.into());
    }
}

fn parse_track(result: &Value) -> Option<Candidate> {
    let id = text(&result["id"])?;
    let title = text(&result["title"]).unwrap_or_default();
    let artist = primary_artists(result);
    let info = &result["more_info"];

    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), FieldValue::from(title.clone()));
    metadata.insert("saavn_track_id".to_string(), FieldValue::from(id));
    insert_opt(&mut metadata, "artist", artist.clone());
    insert_opt(&mut metadata, "album", text(&info["album"]));
    insert_opt(&mut metadata, "saavn_album_id", text(&info["album_id"]));
    insert_opt(&mut metadata, "label", text(&info["label"]));
    insert_opt(&mut metadata, "language", text(&result["language"]));
    insert_opt(&mut metadata, "year", integer(&result["year"]));
    insert_opt(
        &mut metadata,
        "length",
        integer(&info["duration"]).map(|secs| secs as f64),
    );

    Some(Candidate {
        source: SOURCE_NAME.to_string(),
        label: format!("{} - {}", artist.unwrap_or_default(), title),
        metadata,
    })
}

fn parse_album(result: &Value) -> Option<Candidate> {
    let id = text(&result["id"])?;
    let album = text(&result["title"]).unwrap_or_default();
    let albumartist = primary_artists(result);

    let mut metadata = Metadata::new();
    metadata.insert("album".to_string(), FieldValue::from(album.clone()));
    metadata.insert("saavn_album_id".to_string(), FieldValue::from(id));
    insert_opt(&mut metadata, "albumartist", albumartist.clone());
    insert_opt(&mut metadata, "label", text(&result["more_info"]["label"]));
    insert_opt(&mut metadata, "language", text(&result["language"]));
    insert_opt(&mut metadata, "year", integer(&result["year"]));

    Some(Candidate {
        source: SOURCE_NAME.to_string(),
        label: format!("{} - {}", albumartist.unwrap_or_default(), album),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tracks() {
        let body = json!({
            "total": 2,
            "results": [
                {
                    "id": "OkfYN4d2",
                    "title": "Tum Hi Ho",
                    "type": "song",
                    "year": "2013",
                    "language": "hindi",
                    "more_info": {
                        "album": "Aashiqui 2",
                        "album_id": "1139549",
                        "label": "T-Series",
                        "duration": "262",
                        "artistMap": {
                            "primary_artists": [{ "id": "459320", "name": "Arijit Singh" }]
                        }
                    }
                },
                { "title": "no id, dropped" }
            ]
        });

        let candidates = parse_results(&body, parse_track).unwrap();
        assert_eq!(candidates.len(), 1);

        let track = &candidates[0];
        assert_eq!(track.label, "Arijit Singh - Tum Hi Ho");
        assert_eq!(track.metadata["album"], FieldValue::from("Aashiqui 2"));
        assert_eq!(track.metadata["year"], FieldValue::Int(2013));
        assert_eq!(track.metadata["length"], FieldValue::Float(262.0));
        assert_eq!(track.metadata["saavn_track_id"], FieldValue::from("OkfYN4d2"));
        assert_eq!(track.metadata["saavn_album_id"], FieldValue::from("1139549"));
        assert_eq!(track.metadata["language"], FieldValue::from("hindi"));
    }

    #[test]
    fn test_parse_albums_decodes_entities() {
        let body = json!({
            "results": [{
                "id": 26553719,
                "title": "Rock &amp; Roll Hits",
                "year": 2021,
                "language": "english",
                "more_info": {
                    "music": "Various Artists",
                    "artistMap": { "primary_artists": [] }
                }
            }]
        });

        let candidates = parse_results(&body, parse_album).unwrap();
        let album = &candidates[0].metadata;

        assert_eq!(album["album"], FieldValue::from("Rock & Roll Hits"));
        assert_eq!(album["albumartist"], FieldValue::from("Various Artists"));
        assert_eq!(album["saavn_album_id"], FieldValue::from("26553719"));
        assert_eq!(album["year"], FieldValue::Int(2021));
        assert!(!album.contains_key("title"));
        assert!(!album.contains_key("label"));
    }

    #[test]
    fn test_empty_results() {
        assert!(parse_results(&json!({ "results": {} }), parse_track)
            .unwrap()
            .is_empty());
        assert!(parse_results(&json!({}), parse_album).unwrap().is_empty());
        assert!(parse_results(&json!({ "results": "oops" }), parse_album).is_err());
    }
}
