//! Collection loading
//!
//! The collection arrives as a JSON snapshot produced by whatever library
//! manager feeds the exporter. Loading is strict on structure and lenient
//! on content: unknown fields are ignored, missing optional fields get
//! defaults, but a file that does not parse at all is fatal.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use deckbox_core::{Collection, PlaylistNode};

/// Read and parse a collection JSON file
pub fn load(path: &Path) -> anyhow::Result<Collection> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading collection {:?}", path))?;
    let collection: Collection = serde_json::from_str(&data)
        .with_context(|| format!("parsing collection {:?}", path))?;

    if collection.tracks.is_empty() {
        warn!("collection {:?} has no tracks; the export will be empty", path);
    }
    for (i, track) in collection.tracks.iter().enumerate() {
        if track.title.is_empty() {
            warn!("track {} has an empty title", i);
        }
        if track.file_path.is_empty() {
            warn!("track {} ({:?}) has no file path", i, track.title);
        }
    }
    check_playlist_refs(&collection.playlists, collection.tracks.len());

    info!(
        "Loaded collection: {} tracks, {} top-level playlist nodes",
        collection.tracks.len(),
        collection.playlists.len()
    );
    Ok(collection)
}

/// Playlist entries pointing past the track list are dropped upstream
/// concerns; flag them here so the run log explains any missing tracks
fn check_playlist_refs(nodes: &[PlaylistNode], track_count: usize) {
    for node in nodes {
        match node {
            PlaylistNode::Folder { children, .. } => check_playlist_refs(children, track_count),
            PlaylistNode::Playlist { name, tracks } => {
                for &idx in tracks {
                    if idx >= track_count {
                        warn!("playlist {:?} references missing track index {}", name, idx);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_minimal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tracks": [{{"title": "A", "file_path": "/m/a.mp3", "duration_secs": 200.0}}]}}"#
        )
        .unwrap();

        let collection = load(file.path()).unwrap();
        assert_eq!(collection.tracks.len(), 1);
        assert!(collection.playlists.is_empty());
    }

    #[test]
    fn test_load_bad_json_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        assert!(load(Path::new("/nonexistent/collection.json")).is_err());
    }
}
