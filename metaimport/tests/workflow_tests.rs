//! End-to-end import runs against an in-memory library with scripted
//! sources and choosers

use async_trait::async_trait;
use metaimport::chooser::{Choice, Chooser, RankedCandidate};
use metaimport::library::{
    insert_record, load_album, load_album_items, load_records, open_in_memory, LibraryQuery,
    LibraryRecord, RecordKind,
};
use metaimport::merge::{MergeResolver, Record};
use metaimport::sources::{
    AlbumLookup, Candidate, MetadataSource, SourceError, SourceRegistry, SourceResult, TrackLookup,
};
use metaimport::workflow::{ImportMode, ImportOptions, Importer};
use metaimport_common::{FieldValue, MergeStrategy, Metadata};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, VecDeque};

/// Source returning fixed candidates, or failing
struct StubSource {
    name: &'static str,
    ids: &'static [&'static str],
    tracks: Vec<Candidate>,
    albums: Vec<Candidate>,
    fail: bool,
}

impl StubSource {
    fn new(name: &'static str, ids: &'static [&'static str]) -> Self {
        Self {
            name,
            ids,
            tracks: Vec::new(),
            albums: Vec::new(),
            fail: false,
        }
    }

    fn track(mut self, label: &str, fields: &[(&str, FieldValue)]) -> Self {
        self.tracks.push(candidate(self.name, label, fields));
        self
    }

    fn album(mut self, label: &str, fields: &[(&str, FieldValue)]) -> Self {
        self.albums.push(candidate(self.name, label, fields));
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn result(&self, candidates: &[Candidate]) -> SourceResult<Vec<Candidate>> {
        if self.fail {
            return Err(SourceError::Http {
                provider: self.name.to_string(),
                status: 503,
            });
        }
        Ok(candidates.to_vec())
    }
}

impl MetadataSource for StubSource {
    fn name(&self) -> &str {
        self.name
    }

    fn id_fields(&self) -> &'static [&'static str] {
        self.ids
    }

    fn track_lookup(&self) -> Option<&dyn TrackLookup> {
        Some(self)
    }

    fn album_lookup(&self) -> Option<&dyn AlbumLookup> {
        Some(self)
    }
}

#[async_trait]
impl TrackLookup for StubSource {
    async fn search_tracks(&self, _query: &str, _limit: usize) -> SourceResult<Vec<Candidate>> {
        self.result(&self.tracks)
    }
}

#[async_trait]
impl AlbumLookup for StubSource {
    async fn search_albums(&self, _query: &str, _limit: usize) -> SourceResult<Vec<Candidate>> {
        self.result(&self.albums)
    }
}

/// Replays scripted choices, then picks the first candidate
#[derive(Default)]
struct ScriptedChooser {
    script: VecDeque<Choice>,
    prompts: Vec<String>,
}

impl ScriptedChooser {
    fn with(choices: &[Choice]) -> Self {
        Self {
            script: choices.iter().copied().collect(),
            prompts: Vec::new(),
        }
    }
}

impl Chooser for ScriptedChooser {
    fn choose(&mut self, prompt: &str, _candidates: &[RankedCandidate]) -> Choice {
        self.prompts.push(prompt.to_string());
        self.script.pop_front().unwrap_or(Choice::Index(0))
    }
}

fn candidate(source: &str, label: &str, fields: &[(&str, FieldValue)]) -> Candidate {
    Candidate {
        source: source.to_string(),
        label: label.to_string(),
        metadata: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Metadata>(),
    }
}

fn registry(sources: Vec<StubSource>) -> SourceRegistry {
    SourceRegistry::with_sources(
        sources
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn MetadataSource>)
            .collect(),
    )
}

fn two_track_sources() -> SourceRegistry {
    registry(vec![
        StubSource::new("youtube", &["yt_track_id"]).track(
            "Arijit Singh - Tum Hi Ho",
            &[
                ("title", "Tum Hi Ho".into()),
                ("year", 2013.into()),
                ("yt_track_id", "Umqb9KENgmk".into()),
            ],
        ),
        StubSource::new("jiosaavn", &["saavn_track_id"]).track(
            "Arijit Singh - Tum Hi Ho",
            &[
                ("year", "2014".into()),
                ("label", "T-Series".into()),
                ("length", 262.into()),
                ("saavn_track_id", "OkfYN4d2".into()),
            ],
        ),
    ])
}

async fn library_with_item() -> (SqlitePool, i64) {
    let pool = open_in_memory().await.unwrap();
    let mut item = LibraryRecord::new_item("/music/tum_hi_ho.mp3")
        .with("artist", "Arijit Singh")
        .with("title", "Tum Hi Ho");
    let id = insert_record(&pool, &mut item).await.unwrap();
    (pool, id)
}

async fn load_item(pool: &SqlitePool, id: i64) -> LibraryRecord {
    load_records(pool, RecordKind::Item, &LibraryQuery::all())
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == id)
        .unwrap()
}

fn resolver(strategy: MergeStrategy, excluded: &[&str]) -> MergeResolver {
    MergeResolver::new(strategy, excluded.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn test_items_priority_import_and_rerun_is_noop() {
    let (pool, id) = library_with_item().await;
    let sources = two_track_sources();
    let importer = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Priority, &[]),
        ImportOptions::default(),
    );

    let mut out: Vec<u8> = Vec::new();
    let mut chooser = ScriptedChooser::default();
    let summary = importer
        .run(&LibraryQuery::all(), &mut chooser, &mut out)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.changed, 1);
    assert_eq!(chooser.prompts.len(), 2);
    assert!(chooser.prompts[0].contains("youtube"));

    let item = load_item(&pool, id).await;
    assert_eq!(item.get("year"), Some(FieldValue::Int(2013)));
    assert_eq!(item.get("label"), Some(FieldValue::from("T-Series")));
    assert_eq!(item.get("length"), Some(FieldValue::Float(262.0)));
    assert_eq!(item.get("yt_track_id"), Some(FieldValue::from("Umqb9KENgmk")));
    assert_eq!(item.get("saavn_track_id"), Some(FieldValue::from("OkfYN4d2")));

    let shown = String::from_utf8(out).unwrap();
    assert!(shown.starts_with("Arijit Singh - Tum Hi Ho\n"));
    assert!(shown.contains("year:"));
    assert!(shown.contains(" -> 2013"));
    assert!(!shown.contains("title:"));

    // Everything already matches on the second run
    let mut out: Vec<u8> = Vec::new();
    let summary = importer
        .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut out)
        .await
        .unwrap();
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.unchanged, 1);
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_pretend_stores_nothing() {
    let (pool, id) = library_with_item().await;
    let sources = two_track_sources();
    let options = ImportOptions {
        pretend: true,
        ..ImportOptions::default()
    };
    let importer = Importer::new(&pool, &sources, resolver(MergeStrategy::Priority, &[]), options);

    let mut out: Vec<u8> = Vec::new();
    let summary = importer
        .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut out)
        .await
        .unwrap();

    assert_eq!(summary.changed, 1);
    assert!(!out.is_empty());

    let item = load_item(&pool, id).await;
    assert_eq!(item.get("year"), None);
    assert_eq!(item.get("yt_track_id"), None);
}

#[tokio::test]
async fn test_exclusions_and_skip() {
    let (pool, id) = library_with_item().await;
    let sources = two_track_sources();
    let importer = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Priority, &["label", "year"]),
        ImportOptions::default(),
    );

    // Skip youtube, take jiosaavn
    let mut chooser = ScriptedChooser::with(&[Choice::Skip, Choice::Index(0)]);
    importer
        .run(&LibraryQuery::all(), &mut chooser, &mut std::io::sink())
        .await
        .unwrap();

    let item = load_item(&pool, id).await;
    assert_eq!(item.get("year"), None);
    assert_eq!(item.get("label"), None);
    assert_eq!(item.get("yt_track_id"), None);
    assert_eq!(item.get("saavn_track_id"), Some(FieldValue::from("OkfYN4d2")));
}

#[tokio::test]
async fn test_abort_ends_only_current_record() {
    let pool = open_in_memory().await.unwrap();
    for title in ["First Song", "Second Song"] {
        let mut item = LibraryRecord::new_item(format!("/music/{}.mp3", title))
            .with("artist", "Someone")
            .with("title", title);
        insert_record(&pool, &mut item).await.unwrap();
    }

    let sources = two_track_sources();
    let importer = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Priority, &[]),
        ImportOptions::default(),
    );

    // Record 1: take youtube, abort on jiosaavn. Record 2: defaults.
    let mut chooser = ScriptedChooser::with(&[Choice::Index(0), Choice::Abort]);
    let summary = importer
        .run(&LibraryQuery::all(), &mut chooser, &mut std::io::sink())
        .await
        .unwrap();

    assert_eq!(summary.aborted, 1);
    assert_eq!(summary.changed, 1);

    let items = load_records(&pool, RecordKind::Item, &LibraryQuery::all())
        .await
        .unwrap();
    assert_eq!(items[0].get("yt_track_id"), None);
    assert_eq!(items[1].get("yt_track_id"), Some(FieldValue::from("Umqb9KENgmk")));
}

#[tokio::test]
async fn test_failing_source_does_not_stop_others() {
    let (pool, id) = library_with_item().await;
    let sources = registry(vec![
        StubSource::new("youtube", &["yt_track_id"]).failing(),
        StubSource::new("jiosaavn", &["saavn_track_id"])
            .track("Arijit Singh - Tum Hi Ho", &[("saavn_track_id", "OkfYN4d2".into())]),
    ]);
    let importer = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Priority, &[]),
        ImportOptions::default(),
    );

    let mut chooser = ScriptedChooser::default();
    let summary = importer
        .run(&LibraryQuery::all(), &mut chooser, &mut std::io::sink())
        .await
        .unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(chooser.prompts.len(), 1);
    let item = load_item(&pool, id).await;
    assert_eq!(item.get("saavn_track_id"), Some(FieldValue::from("OkfYN4d2")));
}

#[tokio::test]
async fn test_unknown_fields_need_extra_fields() {
    let sources = registry(vec![StubSource::new("youtube", &["yt_track_id"]).track(
        "Arijit Singh - Tum Hi Ho",
        &[("mood", "Sad".into()), ("yt_track_id", "Umqb9KENgmk".into())],
    )]);

    let (pool, id) = library_with_item().await;
    Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Priority, &[]),
        ImportOptions::default(),
    )
    .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut std::io::sink())
    .await
    .unwrap();
    assert_eq!(load_item(&pool, id).await.get("mood"), None);

    let options = ImportOptions {
        extra_fields: BTreeSet::from(["mood".to_string()]),
        ..ImportOptions::default()
    };
    Importer::new(&pool, &sources, resolver(MergeStrategy::Priority, &[]), options)
        .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut std::io::sink())
        .await
        .unwrap();
    assert_eq!(
        load_item(&pool, id).await.get("mood"),
        Some(FieldValue::from("Sad"))
    );
}

#[tokio::test]
async fn test_union_joins_text_column() {
    let sources = registry(vec![
        StubSource::new("youtube", &[]).track("A - B", &[("genre", "Rock".into())]),
        StubSource::new("jiosaavn", &[]).track("A - B", &[("genre", "Pop".into())]),
    ]);

    let (pool, id) = library_with_item().await;
    let importer = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Union, &[]),
        ImportOptions::default(),
    );
    importer
        .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut std::io::sink())
        .await
        .unwrap();

    let item = load_item(&pool, id).await;
    assert_eq!(item.get("genre"), Some(FieldValue::from("Rock; Pop")));

    // Stored form matches the normalized proposal, so nothing changes again
    let summary = importer
        .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut std::io::sink())
        .await
        .unwrap();
    assert_eq!(summary.unchanged, 1);
}

#[tokio::test]
async fn test_unwritable_union_is_not_a_change() {
    let sources = registry(vec![
        StubSource::new("youtube", &[]).track("A - B", &[("year", 2013.into())]),
        StubSource::new("jiosaavn", &[]).track("A - B", &[("year", 2014.into())]),
    ]);

    let (pool, id) = library_with_item().await;
    let importer = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Union, &[]),
        ImportOptions::default(),
    );

    let mut out: Vec<u8> = Vec::new();
    let summary = importer
        .run(&LibraryQuery::all(), &mut ScriptedChooser::default(), &mut out)
        .await
        .unwrap();

    assert_eq!(summary.changed, 0);
    assert_eq!(summary.unchanged, 1);
    assert!(out.is_empty());
    assert_eq!(load_item(&pool, id).await.get("year"), None);
}

#[tokio::test]
async fn test_album_ids_propagate_to_items() {
    let pool = open_in_memory().await.unwrap();
    let mut album = LibraryRecord::new_album()
        .with("albumartist", "The Beatles")
        .with("album", "Abbey Road");
    let album_id = insert_record(&pool, &mut album).await.unwrap();

    for (track, title) in [(1, "Come Together"), (2, "Something")] {
        let mut item = LibraryRecord::new_item(format!("/music/{}.flac", track))
            .with("artist", "The Beatles")
            .with("title", title)
            .with("track", track as i64);
        item.album_id = Some(album_id);
        insert_record(&pool, &mut item).await.unwrap();
    }

    let sources = registry(vec![StubSource::new("youtube", &["yt_album_id"]).album(
        "The Beatles - Abbey Road (Remastered)",
        &[
            ("album", "Abbey Road (Remastered)".into()),
            ("year", 2019.into()),
            ("yt_album_id", "OLAK5uy_abc".into()),
        ],
    )]);

    let options = ImportOptions {
        mode: ImportMode::Albums,
        ids_only: true,
        ..ImportOptions::default()
    };
    let importer = Importer::new(&pool, &sources, resolver(MergeStrategy::Priority, &[]), options);

    let query = LibraryQuery::parse(&["abbey".to_string()]);
    let mut out: Vec<u8> = Vec::new();
    let summary = importer
        .run(&query, &mut ScriptedChooser::default(), &mut out)
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.changed, 1);

    let album = load_album(&pool, album_id).await.unwrap().unwrap();
    assert_eq!(album.get("yt_album_id"), Some(FieldValue::from("OLAK5uy_abc")));
    assert_eq!(album.get("album"), Some(FieldValue::from("Abbey Road")));
    assert_eq!(album.get("year"), None);

    let items = load_album_items(&pool, album_id).await.unwrap();
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.get("yt_album_id"), Some(FieldValue::from("OLAK5uy_abc")));
        assert_eq!(item.get("year"), None);
    }

    let shown = String::from_utf8(out).unwrap();
    assert!(shown.contains("The Beatles - Abbey Road\n"));
    assert!(shown.contains("  The Beatles - Come Together\n"));
}

#[tokio::test]
async fn test_record_without_search_terms_is_skipped() {
    let pool = open_in_memory().await.unwrap();
    let mut item = LibraryRecord::new_item("/music/unknown.mp3");
    insert_record(&pool, &mut item).await.unwrap();

    let sources = two_track_sources();
    let mut chooser = ScriptedChooser::default();
    let summary = Importer::new(
        &pool,
        &sources,
        resolver(MergeStrategy::Priority, &[]),
        ImportOptions::default(),
    )
    .run(&LibraryQuery::all(), &mut chooser, &mut std::io::sink())
    .await
    .unwrap();

    assert_eq!(summary.no_metadata, 1);
    assert!(chooser.prompts.is_empty());
}
