//! Import workflow
//!
//! For each library record matching the query:
//!
//! 1. Query every source (in priority order) with the record's search string
//! 2. Let the chooser pick one candidate per source
//! 3. Merge the picked metadata, normalize it to the record's storage types
//! 4. Diff against the record, print the changes
//! 5. Apply, store, and optionally write file tags
//!
//! Album mode applies the album-level result to the album and then to each
//! of its items. Failures stay local to one source, field or record.

use crate::chooser::{rank_candidates, Choice, Chooser};
use crate::library::{
    load_album_items, load_records, store_record, LibraryQuery, LibraryRecord, RecordKind,
};
use crate::merge::{apply_changes, format_changes, ChangeSet, MergeResolver, Record};
use crate::sources::{Candidate, MetadataSource, SourceRegistry, SourceResult};
use crate::tags::write_tags_blocking;
use anyhow::Result;
use metaimport_common::Metadata;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// Which records are looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    #[default]
    Items,
    Albums,
}

impl ImportMode {
    fn record_kind(&self) -> RecordKind {
        match self {
            ImportMode::Items => RecordKind::Item,
            ImportMode::Albums => RecordKind::Album,
        }
    }

    /// Record fields that make up the lookup query
    fn query_fields(&self) -> &'static [&'static str] {
        match self {
            ImportMode::Items => &["artist", "title"],
            ImportMode::Albums => &["albumartist", "album"],
        }
    }
}

/// Per-run import settings
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// Show changes without storing or tagging
    pub pretend: bool,
    /// Write file tags after storing
    pub write: bool,
    /// Only source identifier fields (`*_id`)
    pub ids_only: bool,
    pub max_candidates: usize,
    /// Attribute names accepted beyond fixed columns and source ids
    pub extra_fields: BTreeSet<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::Items,
            pretend: false,
            write: false,
            ids_only: false,
            max_candidates: 10,
            extra_fields: BTreeSet::new(),
        }
    }
}

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub processed: usize,
    /// Records with at least one writable change
    pub changed: usize,
    pub unchanged: usize,
    /// No candidates chosen or nothing to search with
    pub no_metadata: usize,
    pub aborted: usize,
    /// Store failures
    pub failed: usize,
    pub tags_written: usize,
}

enum Gathered {
    Metadata(HashMap<String, Metadata>),
    Aborted,
}

/// Runs imports against one library
pub struct Importer<'a> {
    pool: &'a SqlitePool,
    sources: &'a SourceRegistry,
    resolver: MergeResolver,
    options: ImportOptions,
}

impl<'a> Importer<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        sources: &'a SourceRegistry,
        resolver: MergeResolver,
        options: ImportOptions,
    ) -> Self {
        Self {
            pool,
            sources,
            resolver,
            options,
        }
    }

    /// Process every record matching `query`
    pub async fn run(
        &self,
        query: &LibraryQuery,
        chooser: &mut dyn Chooser,
        out: &mut dyn Write,
    ) -> Result<ImportSummary> {
        let kind = self.options.mode.record_kind();
        let records = load_records(self.pool, kind, query).await?;
        let total = records.len();

        tracing::info!(
            records = total,
            table = kind.table(),
            sources = ?self.sources.names(),
            strategy = %self.resolver.strategy(),
            pretend = self.options.pretend,
            "Starting import"
        );

        let mut summary = ImportSummary::default();
        for (index, record) in records.into_iter().enumerate() {
            tracing::info!("Processing {}/{}: {}", index + 1, total, record.heading());
            summary.processed += 1;
            self.process_record(&record, chooser, out, &mut summary).await?;
        }

        tracing::info!(
            processed = summary.processed,
            changed = summary.changed,
            unchanged = summary.unchanged,
            no_metadata = summary.no_metadata,
            aborted = summary.aborted,
            failed = summary.failed,
            "Import finished"
        );

        Ok(summary)
    }

    async fn process_record(
        &self,
        record: &LibraryRecord,
        chooser: &mut dyn Chooser,
        out: &mut dyn Write,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let search = record.query_string(self.options.mode.query_fields());
        if search.is_empty() {
            tracing::warn!(id = record.id, "Nothing to search with, skipping");
            summary.no_metadata += 1;
            return Ok(());
        }

        let per_source = match self.gather(&search, &record.heading(), chooser).await {
            Gathered::Metadata(per_source) if per_source.is_empty() => {
                tracing::info!(query = %search, "No metadata found");
                summary.no_metadata += 1;
                return Ok(());
            }
            Gathered::Metadata(per_source) => per_source,
            Gathered::Aborted => {
                tracing::info!(query = %search, "Aborted, record left unchanged");
                summary.aborted += 1;
                return Ok(());
            }
        };

        let mut merged = self.resolver.merge(&self.sources.names(), &per_source);
        if self.options.ids_only {
            merged.retain(|field, _| field.ends_with("_id"));
        }

        match self.stage(record, &merged) {
            None => {
                tracing::info!("{}: no changes", record.heading());
                summary.unchanged += 1;
            }
            Some((changes, updated)) => {
                summary.changed += 1;
                write!(out, "{}", format_changes(&record.heading(), &changes))?;
                self.commit(updated, summary).await;
            }
        }

        if record.kind == RecordKind::Album {
            self.propagate_to_items(record, &merged, out, summary).await?;
        }

        Ok(())
    }

    /// Query each source and collect the chosen candidate's metadata
    async fn gather(
        &self,
        search: &str,
        heading: &str,
        chooser: &mut dyn Chooser,
    ) -> Gathered {
        let mut per_source = HashMap::new();

        for source in self.sources.iter() {
            let candidates = match self.lookup(source, search).await {
                Some(Ok(candidates)) => candidates,
                Some(Err(e)) => {
                    tracing::warn!(source = source.name(), error = %e, "Lookup failed");
                    continue;
                }
                None => {
                    tracing::debug!(source = source.name(), "No lookup for this record type");
                    continue;
                }
            };

            if candidates.is_empty() {
                tracing::info!(source = source.name(), query = %search, "No candidates");
                continue;
            }

            let mut ranked = rank_candidates(search, candidates);
            ranked.truncate(self.options.max_candidates.max(1));

            let prompt = format!("Choose {} candidate for {}", source.name(), heading);
            match chooser.choose(&prompt, &ranked) {
                Choice::Index(i) => match ranked.into_iter().nth(i) {
                    Some(chosen) => {
                        per_source.insert(source.name().to_string(), chosen.candidate.metadata);
                    }
                    None => {
                        tracing::warn!(
                            source = source.name(),
                            index = i,
                            "Choice out of range, skipping"
                        );
                    }
                },
                Choice::Skip => {
                    tracing::debug!(source = source.name(), "Skipped");
                }
                Choice::Abort => return Gathered::Aborted,
            }
        }

        Gathered::Metadata(per_source)
    }

    async fn lookup(
        &self,
        source: &dyn MetadataSource,
        search: &str,
    ) -> Option<SourceResult<Vec<Candidate>>> {
        let limit = self.options.max_candidates;
        match self.options.mode {
            ImportMode::Items => Some(source.track_lookup()?.search_tracks(search, limit).await),
            ImportMode::Albums => Some(source.album_lookup()?.search_albums(search, limit).await),
        }
    }

    /// Fields this record may receive
    fn known_fields(&self, record: &LibraryRecord) -> BTreeSet<String> {
        let mut known = record.known_fields();
        known.extend(self.sources.declared_fields());
        known.extend(self.options.extra_fields.iter().cloned());
        known
    }

    /// Normalize merged values to the record's storage form, then diff
    fn propose(&self, record: &LibraryRecord, merged: &Metadata) -> ChangeSet {
        let normalized: Metadata = merged
            .iter()
            .map(|(field, value)| (field.clone(), record.normalize(field, value)))
            .collect();

        self.resolver
            .changes(&record.values(), &normalized, &self.known_fields(record))
    }

    /// Apply the proposal to a copy of `record`.
    ///
    /// Returns the changes that were actually written together with the
    /// updated copy, or `None` when no field could be changed.
    fn stage(
        &self,
        record: &LibraryRecord,
        merged: &Metadata,
    ) -> Option<(ChangeSet, LibraryRecord)> {
        let mut changes = self.propose(record, merged);
        if changes.is_empty() {
            return None;
        }

        let mut updated = record.clone();
        let applied = apply_changes(&mut updated, &changes);
        changes.retain(|field, _| applied.contains(field));

        if changes.is_empty() {
            tracing::debug!(id = record.id, "No proposed field could be written");
            return None;
        }
        Some((changes, updated))
    }

    /// Store and tag one staged record. Failures are logged and counted.
    async fn commit(&self, mut record: LibraryRecord, summary: &mut ImportSummary) {
        if self.options.pretend {
            return;
        }

        if let Err(e) = store_record(self.pool, &mut record).await {
            tracing::warn!(
                id = record.id,
                table = record.kind.table(),
                error = %e,
                "Store failed"
            );
            summary.failed += 1;
            return;
        }

        if self.options.write {
            if let Some(path) = record.path.clone() {
                match write_tags_blocking(path, record.values()).await {
                    Ok(written) if !written.is_empty() => summary.tags_written += 1,
                    Ok(_) => {}
                    Err(e) => tracing::warn!(id = record.id, error = %e, "Tag write failed"),
                }
            }
        }
    }

    async fn propagate_to_items(
        &self,
        album: &LibraryRecord,
        merged: &Metadata,
        out: &mut dyn Write,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let items = match load_album_items(self.pool, album.id).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(album_id = album.id, error = %e, "Could not load album items");
                return Ok(());
            }
        };

        for item in items {
            let Some((changes, updated)) = self.stage(&item, merged) else {
                continue;
            };

            let heading = format!("  {}", item.heading());
            write!(out, "{}", format_changes(&heading, &changes))?;
            self.commit(updated, summary).await;
        }

        Ok(())
    }
}
