//! metaimport - fetch metadata from online catalogs into a music library
//!
//! Looks up library items or albums on the configured sources, lets the user
//! pick a candidate per source, merges the picks and stores the changed
//! fields.

use anyhow::Result;
use clap::{Parser, Subcommand};
use metaimport::chooser::{AutoChooser, ConsoleChooser};
use metaimport::library::{init_library_pool, LibraryQuery};
use metaimport::merge::MergeResolver;
use metaimport::sources::SourceRegistry;
use metaimport::workflow::{ImportMode, ImportOptions, ImportSummary, Importer};
use metaimport_common::config::{load_config, resolve_library_path, ConfigSource, TomlConfig};
use metaimport_common::MergeStrategy;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for metaimport
#[derive(Parser, Debug)]
#[command(name = "metaimport")]
#[command(about = "Fetch track and album metadata from online sources")]
#[command(version)]
struct Args {
    /// Config file (default: METAIMPORT_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Library database (default: METAIMPORT_LIBRARY, then config, then data dir)
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up metadata for matching records and apply it
    Import(ImportArgs),
    /// Fetch source identifiers for matching albums
    GetIds(GetIdsArgs),
}

#[derive(clap::Args, Debug)]
struct ImportArgs {
    /// Query terms: `field:value` or bare words
    query: Vec<String>,

    /// Look up albums instead of tracks
    #[arg(short, long)]
    albums: bool,

    /// Show changes without storing them
    #[arg(short, long)]
    pretend: bool,

    /// Write file tags after storing
    #[arg(short, long, overrides_with = "nowrite")]
    write: bool,

    /// Do not write file tags
    #[arg(long, overrides_with = "write")]
    nowrite: bool,

    /// Take the best candidate without prompting
    #[arg(long)]
    auto: bool,

    /// Merge strategy (overrides config)
    #[arg(short, long, value_parser = ["priority", "union"])]
    strategy: Option<String>,
}

#[derive(clap::Args, Debug)]
struct GetIdsArgs {
    /// Album query terms: `field:value` or bare words
    query: Vec<String>,

    /// Show changes without storing them
    #[arg(short, long)]
    pretend: bool,

    /// Take the best candidate without prompting
    #[arg(long)]
    auto: bool,
}

/// One resolved run: what to process and how
struct RunPlan {
    query: LibraryQuery,
    options: ImportOptions,
    strategy: MergeStrategy,
    auto: bool,
}

impl RunPlan {
    fn from_command(command: Command, config: &TomlConfig) -> Self {
        let settings = &config.metaimport;
        let base = ImportOptions {
            max_candidates: settings.max_candidates,
            extra_fields: settings.extra_fields.clone(),
            write: settings.write,
            ..ImportOptions::default()
        };

        match command {
            Command::Import(args) => {
                let write = if args.write {
                    true
                } else if args.nowrite {
                    false
                } else {
                    base.write
                };

                Self {
                    query: LibraryQuery::parse(&args.query),
                    options: ImportOptions {
                        mode: if args.albums {
                            ImportMode::Albums
                        } else {
                            ImportMode::Items
                        },
                        pretend: args.pretend,
                        write,
                        ..base
                    },
                    strategy: args
                        .strategy
                        .as_deref()
                        .map(MergeStrategy::from_name)
                        .unwrap_or(settings.merge_strategy),
                    auto: args.auto,
                }
            }
            Command::GetIds(args) => Self {
                query: LibraryQuery::parse(&args.query),
                options: ImportOptions {
                    mode: ImportMode::Albums,
                    pretend: args.pretend,
                    ids_only: true,
                    write: false,
                    ..base
                },
                strategy: settings.merge_strategy,
                auto: args.auto,
            },
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // RUST_LOG directives take precedence over the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn log_summary(summary: &ImportSummary) {
    info!(
        "Done: {} processed, {} changed, {} unchanged, {} without metadata, {} aborted, {} failed",
        summary.processed,
        summary.changed,
        summary.unchanged,
        summary.no_metadata,
        summary.aborted,
        summary.failed
    );
    if summary.tags_written > 0 {
        info!("Tags written to {} files", summary.tags_written);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref())?;
    let config = loaded.config;

    init_tracing(args.debug || config.metaimport.debug);

    info!("Starting metaimport v{}", env!("CARGO_PKG_VERSION"));
    match &loaded.source {
        ConfigSource::File(path) => info!("Config: {}", path.display()),
        ConfigSource::Defaults => info!("No config file found, using defaults"),
    }

    let library_path = resolve_library_path(args.library.as_deref(), &config);
    info!("Library: {}", library_path.display());
    let pool = init_library_pool(&library_path).await?;

    let registry = SourceRegistry::from_config(&config);
    if registry.is_empty() {
        anyhow::bail!("No usable metadata sources configured");
    }
    info!("Sources: {}", registry.names().join(", "));

    let plan = RunPlan::from_command(args.command, &config);
    let resolver = MergeResolver::new(plan.strategy, config.metaimport.exclude_fields.clone());
    let importer = Importer::new(&pool, &registry, resolver, plan.options);

    let mut stdout = std::io::stdout();
    let summary = if plan.auto {
        let mut chooser = AutoChooser::new(config.metaimport.auto_threshold);
        importer.run(&plan.query, &mut chooser, &mut stdout).await?
    } else {
        let mut chooser = ConsoleChooser::stdio();
        importer.run(&plan.query, &mut chooser, &mut stdout).await?
    };

    log_summary(&summary);
    pool.close().await;

    Ok(())
}
