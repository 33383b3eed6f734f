//! deckbox command line
//!
//! Reads a collection JSON file and writes a complete device export.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use deckbox_export::{collection, export, ExportConfig, MetadataSource};

#[derive(Parser)]
#[command(name = "deckbox")]
#[command(about = "Export a music collection to a DJ player device layout")]
struct Cli {
    /// Path to the collection JSON file
    collection: PathBuf,

    /// Device root to write the export under
    output_dir: PathBuf,

    /// Directory searched for audio files that moved since the
    /// collection was written
    #[arg(short, long)]
    source_dir: Option<PathBuf>,

    /// Database page size in bytes (4096-65536)
    #[arg(long, default_value_t = 4096, value_parser = clap::value_parser!(u32).range(4096..=65536))]
    page_size: u32,

    /// Also write extended (.EXT) analysis files
    #[arg(long)]
    extended: bool,

    /// Also write the alternate-name database copy (PIONEER/EXPORT.PDB)
    #[arg(long)]
    secondary_db: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ExportConfig::new(cli.collection, cli.output_dir);
    config.source_dir = cli.source_dir;
    config.page_size = cli.page_size as usize;
    config.extended_analysis = cli.extended;
    config.secondary_database = cli.secondary_db;

    let collection = collection::load(&config.collection)?;
    let summary = export(&config, &collection.tracks, &MetadataSource)?;

    info!(
        "Done: {} tracks, {} analysis files, {} audio files copied",
        summary.tracks_exported, summary.analysis_files, summary.audio_copied
    );
    if summary.audio_missing > 0 {
        info!("{} audio files were not found; see warnings above", summary.audio_missing);
    }
    Ok(())
}
