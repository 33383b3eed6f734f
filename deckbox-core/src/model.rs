//! Normalized collection and analysis data model
//!
//! These are the structures handed over by the collection parser and the
//! audio analyzer. Everything downstream treats them as an immutable
//! snapshot; a run never mutates its input.

use serde::{Deserialize, Serialize};

/// One track of the normalized collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Track title from metadata
    pub title: String,
    /// Artist name (empty when untagged)
    #[serde(default)]
    pub artist: String,
    /// Album name
    #[serde(default)]
    pub album: Option<String>,
    /// Genre
    #[serde(default)]
    pub genre: Option<String>,
    /// Record label
    #[serde(default)]
    pub label: Option<String>,
    /// Track comment
    #[serde(default)]
    pub comment: Option<String>,
    /// Source file path on the exporting machine
    pub file_path: String,
    /// File size in bytes
    #[serde(default)]
    pub file_size: u64,
    /// Bit rate in kbps
    #[serde(default)]
    pub bitrate: u32,
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Sample depth in bits
    #[serde(default = "default_sample_depth")]
    pub sample_depth: u8,
    /// Tagged BPM, if any
    #[serde(default)]
    pub bpm: Option<f64>,
    /// Musical key notation as tagged ("8A", "11B", ...)
    #[serde(default)]
    pub key: Option<String>,
    /// Replay gain in dB
    #[serde(default)]
    pub gain_db: f64,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Source rating on the 0-255 scale
    #[serde(default)]
    pub rating: u8,
    /// Track number within the album
    #[serde(default)]
    pub track_number: u16,
    /// Disc number
    #[serde(default)]
    pub disc_number: u16,
    /// Import date as "YYYY-MM-DD"
    #[serde(default)]
    pub import_date: Option<String>,
    /// Release date as "YYYY-MM-DD"
    #[serde(default)]
    pub release_date: Option<String>,
    /// Mix/version name
    #[serde(default)]
    pub mix_name: Option<String>,
    /// Cue points
    #[serde(default)]
    pub cues: Vec<CuePoint>,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_sample_depth() -> u8 {
    16
}

/// Cue point kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CueKind {
    /// Plain position marker
    Position,
    /// Loop with a length
    Loop,
    /// Beatgrid anchor
    GridAnchor,
}

impl Default for CueKind {
    fn default() -> Self {
        CueKind::Position
    }
}

/// A cue point belonging to exactly one track
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CuePoint {
    /// Start offset in milliseconds
    pub start_ms: u32,
    /// Loop length in milliseconds, if this cue is a loop
    #[serde(default)]
    pub length_ms: Option<u32>,
    /// Cue kind
    #[serde(default)]
    pub kind: CueKind,
    /// Hot-cue slot 1-8; absent for memory cues
    #[serde(default)]
    pub hot_cue: Option<u8>,
    /// Color as "#RRGGBB", bare hex, or a decimal integer string
    #[serde(default)]
    pub color: Option<String>,
    /// Cue comment
    #[serde(default)]
    pub comment: Option<String>,
}

impl CuePoint {
    /// End offset in milliseconds, if the cue has a length
    pub fn end_ms(&self) -> Option<u32> {
        self.length_ms.map(|len| self.start_ms.saturating_add(len))
    }
}

/// Playlist tree node handed over by the collection parser
///
/// Carried through the interface; the device database built here has no
/// playlist tables, so the tree only informs which tracks are exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PlaylistNode {
    Folder {
        name: String,
        children: Vec<PlaylistNode>,
    },
    Playlist {
        name: String,
        /// Indices into the collection's track list
        tracks: Vec<usize>,
    },
}

/// The full normalized collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub playlists: Vec<PlaylistNode>,
}

/// Single beat of a beatgrid
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Beat {
    /// Position within the bar (1-4 for 4/4 time)
    pub beat_number: u8,
    /// Tempo at this beat, BPM x 100
    pub tempo_100: u16,
    /// Time from track start in milliseconds
    pub time_ms: u32,
}

/// Per-track analysis results from the audio-analysis collaborator
///
/// The encoders consume whatever is here; empty envelopes produce flat
/// placeholder output rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackAnalysis {
    /// Detected tempo in BPM
    pub bpm: f64,
    /// Ordered beat timestamps
    pub beats: Vec<Beat>,
    /// Amplitude envelope, 0.0-1.0, arbitrary resolution
    pub amplitude: Vec<f32>,
    /// Coarse low/mid/high spectral energy per window, 0.0-1.0 each
    pub bands: Vec<[f32; 3]>,
}

/// Default tempo written when no analysis is available
pub const PLACEHOLDER_BPM: f64 = 120.0;

impl TrackAnalysis {
    /// Neutral stand-in used when the analyzer is absent or failed
    pub fn placeholder() -> Self {
        Self {
            bpm: PLACEHOLDER_BPM,
            beats: Vec::new(),
            amplitude: Vec::new(),
            bands: Vec::new(),
        }
    }

    /// Constant-tempo grid starting at `first_beat_ms`
    pub fn constant_grid(bpm: f64, first_beat_ms: f64, duration_ms: f64) -> Vec<Beat> {
        if bpm <= 0.0 {
            return Vec::new();
        }
        let beat_len = 60_000.0 / bpm;
        let tempo_100 = (bpm * 100.0).round().min(u16::MAX as f64) as u16;

        let mut beats = Vec::new();
        let mut time = first_beat_ms;
        let mut beat_in_bar = 1u8;
        while time < duration_ms {
            beats.push(Beat {
                beat_number: beat_in_bar,
                tempo_100,
                time_ms: time as u32,
            });
            time += beat_len;
            beat_in_bar = if beat_in_bar == 4 { 1 } else { beat_in_bar + 1 };
        }
        beats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_grid() {
        let beats = TrackAnalysis::constant_grid(128.0, 100.0, 10_000.0);
        // ~468.75 ms per beat at 128 BPM, so about 21 beats in 10 seconds
        assert!(beats.len() > 20);
        assert_eq!(beats[0].beat_number, 1);
        assert_eq!(beats[0].tempo_100, 12800);
        assert_eq!(beats[4].beat_number, 1);
    }

    #[test]
    fn test_placeholder() {
        let analysis = TrackAnalysis::placeholder();
        assert_eq!(analysis.bpm, 120.0);
        assert!(analysis.beats.is_empty());
        assert!(analysis.amplitude.is_empty());
    }

    #[test]
    fn test_cue_end() {
        let cue = CuePoint {
            start_ms: 5000,
            length_ms: Some(4000),
            kind: CueKind::Loop,
            ..Default::default()
        };
        assert_eq!(cue.end_ms(), Some(9000));
    }

    #[test]
    fn test_collection_json_interface() {
        let json = r#"{
            "tracks": [{
                "title": "Test",
                "artist": "Someone",
                "file_path": "/music/test.mp3",
                "duration_secs": 241.5,
                "cues": [{"start_ms": 1000, "kind": "position", "hot_cue": 1}]
            }],
            "playlists": [{"type": "playlist", "name": "Set", "tracks": [0]}]
        }"#;
        let collection: Collection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.tracks.len(), 1);
        assert_eq!(collection.tracks[0].sample_rate, 44100);
        assert_eq!(collection.tracks[0].cues[0].hot_cue, Some(1));
    }
}
