//! metaimport library interface
//!
//! Exposes the merge resolver, sources, library store, chooser and import
//! workflow for the binary and for integration testing.

pub mod chooser;
pub mod library;
pub mod merge;
pub mod sources;
pub mod tags;
pub mod workflow;

pub use chooser::{AutoChooser, Choice, Chooser, ConsoleChooser, RankedCandidate};
pub use merge::{apply_changes, compute_changes, merge, ChangeSet, MergeResolver, Record};
pub use sources::{Candidate, MetadataSource, SourceError, SourceRegistry};
pub use workflow::{ImportMode, ImportOptions, ImportSummary, Importer};
