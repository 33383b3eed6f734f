//! Device export generation
//!
//! Creates the complete player-compatible device directory structure:
//! - PIONEER/rekordbox/export.pdb (plus optional PIONEER/EXPORT.PDB copy)
//! - PIONEER/USBANLZ/ANLZxxxxxx.DAT (and .EXT when enabled)
//! - Contents/[renamed audio files]
//!
//! Bad input values are clamped and logged upstream; the failures that
//! reach this layer are I/O faults, and those abort the run and remove
//! the files it wrote so a device is never left half-written. Files from
//! an earlier successful export are left alone.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use deckbox_core::{anlz, path, AnalysisVariant, DatabaseWriter, Track, TrackAnalysis};

use crate::analyzer::AnalysisSource;
use crate::config::ExportConfig;

/// What one export run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    pub tracks_exported: u32,
    pub cue_rows: u32,
    pub database_bytes: u64,
    pub database_pages: u32,
    pub analysis_files: u32,
    /// Tracks that fell back to placeholder analysis
    pub placeholder_tracks: u32,
    pub audio_copied: u32,
    pub audio_missing: u32,
}

/// Export a collection to a device directory
///
/// On an I/O fault every file this run wrote is removed before the error
/// propagates; output from a previous run stays on the device.
pub fn export(
    config: &ExportConfig,
    tracks: &[Track],
    source: &dyn AnalysisSource,
) -> anyhow::Result<RunSummary> {
    let mut written = Vec::new();
    let result = write_export(config, tracks, source, &mut written);
    if result.is_err() {
        cleanup(&config.output_dir, &written);
    }
    result
}

fn write_export(
    config: &ExportConfig,
    tracks: &[Track],
    source: &dyn AnalysisSource,
    written: &mut Vec<PathBuf>,
) -> anyhow::Result<RunSummary> {
    info!("Exporting {} tracks to {:?}", tracks.len(), config.output_dir);

    let database_dir = config.output_dir.join(path::DATABASE_DIR);
    let analysis_dir = config.output_dir.join(path::ANALYSIS_DIR);
    let contents_dir = config.output_dir.join(path::CONTENTS_DIR);
    fs::create_dir_all(&database_dir)?;
    fs::create_dir_all(&analysis_dir)?;
    fs::create_dir_all(&contents_dir)?;

    let mut summary = RunSummary::default();

    // Database first: a reference failure here is a bug worth surfacing
    // before any per-track files land on the device
    let db = DatabaseWriter::new(config.page_size).build(tracks)?;
    write_file(&database_dir.join(path::DATABASE_FILE), &db.data, written)?;
    info!("Wrote {} ({} bytes, {} pages)", path::DATABASE_FILE, db.data.len(), db.page_count);

    if config.secondary_database {
        let secondary = config.output_dir.join(path::SECONDARY_DATABASE_PATH);
        write_file(&secondary, &db.data, written)?;
        debug!("Wrote alternate database copy {:?}", secondary);
    }

    summary.tracks_exported = db.track_rows;
    summary.cue_rows = db.cue_rows;
    summary.database_bytes = db.data.len() as u64;
    summary.database_pages = db.page_count;

    for (index, track) in tracks.iter().enumerate() {
        let track_id = (index + 1) as u32;

        let analysis = match source.analyze(track) {
            Some(analysis) => analysis,
            None => {
                debug!("no analysis for {:?}, writing placeholder", track.title);
                summary.placeholder_tracks += 1;
                TrackAnalysis::placeholder()
            }
        };

        let device_path = path::contents_path(track_id, &track.file_path);

        let variants: &[AnalysisVariant] = if config.extended_analysis {
            &[AnalysisVariant::Primary, AnalysisVariant::Extended]
        } else {
            &[AnalysisVariant::Primary]
        };
        for &variant in variants {
            let rel = path::analysis_path(track_id, variant);
            let data = anlz::build_analysis_file(variant, &device_path, &analysis, &track.cues);
            write_file(&config.output_dir.join(path::relative(&rel)), &data, written)?;
            summary.analysis_files += 1;
        }

        copy_audio(config, track, &device_path, &mut summary, written)?;
    }

    info!(
        "Export complete: {} tracks, {} cue rows, {} analysis files ({} placeholder), {} audio files copied, {} missing",
        summary.tracks_exported,
        summary.cue_rows,
        summary.analysis_files,
        summary.placeholder_tracks,
        summary.audio_copied,
        summary.audio_missing,
    );
    Ok(summary)
}

/// Copy a track's audio file to its renamed Contents location
///
/// The collection path is tried as-is first; when it does not resolve,
/// the source directory is searched for a file with the same name. A
/// missing source is logged and counted, never fatal: the database row
/// and analysis file still let the rest of the export load.
fn copy_audio(
    config: &ExportConfig,
    track: &Track,
    device_path: &str,
    summary: &mut RunSummary,
    written: &mut Vec<PathBuf>,
) -> anyhow::Result<()> {
    let dest = config.output_dir.join(path::relative(device_path));

    let source_file = Path::new(&track.file_path);
    let resolved: Option<PathBuf> = if source_file.is_file() {
        Some(source_file.to_path_buf())
    } else {
        config
            .source_dir
            .as_deref()
            .and_then(|dir| find_by_name(dir, source_file))
    };

    match resolved {
        Some(src) => {
            fs::copy(&src, &dest)?;
            debug!("Copied {:?} -> {:?}", src, dest);
            written.push(dest);
            summary.audio_copied += 1;
        }
        None => {
            warn!("audio file not found for {:?}: {}", track.title, track.file_path);
            summary.audio_missing += 1;
        }
    }
    Ok(())
}

fn find_by_name(dir: &Path, wanted: &Path) -> Option<PathBuf> {
    let name = wanted.file_name()?;
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path())
}

fn write_file(path: &Path, data: &[u8], written: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data)?;
    written.push(path.to_path_buf());
    Ok(())
}

/// Remove the files this run wrote after a fault
///
/// Only recorded paths are deleted; a prior export already on the device
/// stays intact. Directories are pruned only when the removals left them
/// empty.
fn cleanup(output_dir: &Path, written: &[PathBuf]) {
    warn!("export failed, removing {} partially written files", written.len());
    for file in written {
        if let Err(e) = fs::remove_file(file) {
            warn!("could not remove {:?}: {}", file, e);
        }
    }
    for dir in [
        path::ANALYSIS_DIR,
        path::DATABASE_DIR,
        "PIONEER",
        path::CONTENTS_DIR,
    ] {
        // Fails on non-empty directories, which is the point
        let _ = fs::remove_dir(output_dir.join(dir));
    }
}
