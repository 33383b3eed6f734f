//! Analysis acquisition
//!
//! The exporter does not decode audio itself; it asks an `AnalysisSource`
//! for per-track results and falls back to a placeholder when the source
//! has nothing. The built-in `MetadataSource` derives what it can from
//! collection metadata alone: a constant beatgrid from the tagged BPM and
//! neutral waveform envelopes, which keeps exported tracks loadable and
//! beat-synced on hardware without a decoding stage.

use deckbox_core::{Track, TrackAnalysis};
use tracing::debug;

/// Supplier of per-track analysis results
///
/// Return `None` when no analysis is available for the track; the
/// exporter substitutes a placeholder and counts the fallback in the run
/// summary.
pub trait AnalysisSource {
    fn analyze(&self, track: &Track) -> Option<TrackAnalysis>;
}

/// Analysis derived purely from collection metadata
pub struct MetadataSource;

impl AnalysisSource for MetadataSource {
    fn analyze(&self, track: &Track) -> Option<TrackAnalysis> {
        let bpm = track.bpm.filter(|b| *b > 0.0)?;
        let duration_ms = track.duration_secs * 1000.0;

        debug!("deriving constant grid for {:?} at {} BPM", track.title, bpm);
        Some(TrackAnalysis {
            bpm,
            beats: TrackAnalysis::constant_grid(bpm, 0.0, duration_ms),
            // No decoded signal, so the waveform encoders emit their flat
            // placeholder shapes
            amplitude: Vec::new(),
            bands: Vec::new(),
        })
    }
}

/// Source that never has analysis; every track gets the placeholder
pub struct NullSource;

impl AnalysisSource for NullSource {
    fn analyze(&self, _track: &Track) -> Option<TrackAnalysis> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(bpm: Option<f64>) -> Track {
        serde_json::from_value(serde_json::json!({
            "title": "T",
            "file_path": "/m/t.mp3",
            "duration_secs": 180.0,
            "bpm": bpm,
        }))
        .unwrap()
    }

    #[test]
    fn test_metadata_source_uses_tagged_bpm() {
        let analysis = MetadataSource.analyze(&track(Some(128.0))).unwrap();
        assert_eq!(analysis.bpm, 128.0);
        assert!(!analysis.beats.is_empty());
        assert_eq!(analysis.beats[0].tempo_100, 12800);
    }

    #[test]
    fn test_metadata_source_without_bpm() {
        assert!(MetadataSource.analyze(&track(None)).is_none());
        assert!(MetadataSource.analyze(&track(Some(0.0))).is_none());
    }
}
