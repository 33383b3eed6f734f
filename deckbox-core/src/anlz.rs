//! Analysis file generation (.DAT, .EXT)
//!
//! Analysis files are **big-endian**, unlike the little-endian database;
//! endianness is a property of each format, never of the program. A file
//! is a 20-byte container header followed by tagged sections:
//! - PPTH: audio file path
//! - PQTZ: quantized beatgrid
//! - PWAV: mono preview waveform (400 bytes, always)
//! - PWV5: color waveform (1200 two-byte samples, always)
//! - PCOB: hot cues
//! - PCO2: hot cues with color (extended variant)
//!
//! Every section frame is: 4-character tag, u32 header length (tag and
//! length fields included), u32 payload length, tag-specific header
//! fields, payload. When no analysis data is available the encoders fall
//! back to fixed neutral placeholders so the file stays structurally
//! valid; a track always gets a loadable analysis file.

use tracing::warn;

use crate::model::{Beat, CuePoint, TrackAnalysis};
use crate::path::AnalysisVariant;
use crate::rows::cue_type_code;

/// Container signature
const CONTAINER_TAG: &[u8; 4] = b"PMAI";
/// Section tags
const PATH_TAG: &[u8; 4] = b"PPTH";
const BEATGRID_TAG: &[u8; 4] = b"PQTZ";
const MONO_WAVEFORM_TAG: &[u8; 4] = b"PWAV";
const COLOR_WAVEFORM_TAG: &[u8; 4] = b"PWV5";
const HOT_CUE_TAG: &[u8; 4] = b"PCOB";
const HOT_CUE_COLOR_TAG: &[u8; 4] = b"PCO2";

/// Container header: tag + header length + file length + 8 reserved bytes
const CONTAINER_HEADER_LEN: usize = 20;
/// Common part of every section header: tag + two length fields
const SECTION_BASE_LEN: usize = 12;

/// Mono waveform sample count, fixed regardless of track length
pub const MONO_WAVEFORM_SAMPLES: usize = 400;
/// Color waveform sample count, fixed regardless of track length
pub const COLOR_WAVEFORM_SAMPLES: usize = 1200;
/// Beatgrid entry cap
pub const MAX_GRID_BEATS: usize = 1000;
/// Hardware hot-cue slot limit
pub const MAX_HOT_CUES: usize = 8;

/// Neutral placeholder levels used when analysis data is missing
const PLACEHOLDER_MONO_HEIGHT: u8 = 8;
const PLACEHOLDER_COLOR: [u8; 3] = [2, 2, 2];
const PLACEHOLDER_COLOR_HEIGHT: u8 = 8;

/// Opaque marker opening every extended cue entry, reproduced verbatim
const CUE_COLOR_ENTRY_MARKER: [u8; 4] = *b"PCP2";
/// End value for cues without a loop length
const NO_LOOP_END: u32 = 0xFFFF_FFFF;

/// Frame one section: tag, header length, payload length, extra header
/// fields, payload
fn section(tag: &[u8; 4], head_fields: &[u8], payload: &[u8]) -> Vec<u8> {
    let header_len = (SECTION_BASE_LEN + head_fields.len()) as u32;
    let mut out = Vec::with_capacity(header_len as usize + payload.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(head_fields);
    out.extend_from_slice(payload);
    out
}

/// PPTH: device path of the audio file as UTF-16BE with a NUL terminator
fn path_section(device_path: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(device_path.len() * 2 + 2);
    for unit in device_path.encode_utf16() {
        payload.extend_from_slice(&unit.to_be_bytes());
    }
    payload.extend_from_slice(&0u16.to_be_bytes());

    section(PATH_TAG, &(payload.len() as u32).to_be_bytes(), &payload)
}

/// PQTZ: beat count then 8-byte records (beat-in-bar, tempo x100, time ms)
fn beatgrid_section(beats: &[Beat]) -> Vec<u8> {
    let beats = if beats.len() > MAX_GRID_BEATS {
        warn!("beatgrid truncated from {} to {} beats", beats.len(), MAX_GRID_BEATS);
        &beats[..MAX_GRID_BEATS]
    } else {
        beats
    };

    let mut payload = Vec::with_capacity(beats.len() * 8);
    for beat in beats {
        payload.extend_from_slice(&(beat.beat_number as u16).to_be_bytes());
        payload.extend_from_slice(&beat.tempo_100.to_be_bytes());
        payload.extend_from_slice(&beat.time_ms.to_be_bytes());
    }

    section(BEATGRID_TAG, &(beats.len() as u32).to_be_bytes(), &payload)
}

/// Mean of the bucket of `src` covering position `i` of `buckets`
fn bucket_mean(src: &[f32], buckets: usize, i: usize) -> f32 {
    let start = i * src.len() / buckets;
    let end = ((i + 1) * src.len() / buckets).max(start + 1).min(src.len());
    let slice = &src[start..end];
    slice.iter().sum::<f32>() / slice.len() as f32
}

/// PWAV: exactly 400 one-byte samples, the 5-bit amplitude left-shifted
///
/// The amplitude envelope is downsampled to 400 points whatever its
/// resolution; an empty envelope produces the flat placeholder.
fn mono_waveform_section(amplitude: &[f32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(MONO_WAVEFORM_SAMPLES);
    for i in 0..MONO_WAVEFORM_SAMPLES {
        let height = if amplitude.is_empty() {
            PLACEHOLDER_MONO_HEIGHT
        } else {
            (bucket_mean(amplitude, MONO_WAVEFORM_SAMPLES, i) * 31.0).clamp(0.0, 31.0) as u8
        };
        payload.push((height & 0x1F) << 3);
    }

    section(
        MONO_WAVEFORM_TAG,
        &(MONO_WAVEFORM_SAMPLES as u32).to_be_bytes(),
        &payload,
    )
}

/// Pack one color sample: 3-bit R/G/B, 5-bit height, 2 unused bits
fn pack_color_sample(r: u8, g: u8, b: u8, height: u8) -> u16 {
    ((r as u16 & 0x07) << 13)
        | ((g as u16 & 0x07) << 10)
        | ((b as u16 & 0x07) << 7)
        | ((height as u16 & 0x1F) << 2)
}

/// PWV5: exactly 1200 two-byte samples from the coarse low/mid/high
/// spectral split; low maps to red, mid to green, high to blue
fn color_waveform_section(bands: &[[f32; 3]], amplitude: &[f32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(COLOR_WAVEFORM_SAMPLES * 2);
    for i in 0..COLOR_WAVEFORM_SAMPLES {
        let (r, g, b) = if bands.is_empty() {
            (PLACEHOLDER_COLOR[0], PLACEHOLDER_COLOR[1], PLACEHOLDER_COLOR[2])
        } else {
            let start = i * bands.len() / COLOR_WAVEFORM_SAMPLES;
            let end = ((i + 1) * bands.len() / COLOR_WAVEFORM_SAMPLES)
                .max(start + 1)
                .min(bands.len());
            let slice = &bands[start..end];
            let mut sums = [0.0f32; 3];
            for window in slice {
                for (sum, value) in sums.iter_mut().zip(window) {
                    *sum += value;
                }
            }
            let scale = 7.0 / slice.len() as f32;
            (
                (sums[0] * scale).clamp(0.0, 7.0) as u8,
                (sums[1] * scale).clamp(0.0, 7.0) as u8,
                (sums[2] * scale).clamp(0.0, 7.0) as u8,
            )
        };
        let height = if amplitude.is_empty() {
            PLACEHOLDER_COLOR_HEIGHT
        } else {
            (bucket_mean(amplitude, COLOR_WAVEFORM_SAMPLES, i) * 31.0).clamp(0.0, 31.0) as u8
        };
        payload.extend_from_slice(&pack_color_sample(r, g, b, height).to_be_bytes());
    }

    section(
        COLOR_WAVEFORM_TAG,
        &(COLOR_WAVEFORM_SAMPLES as u32).to_be_bytes(),
        &payload,
    )
}

/// Hot cues bound to a slot, capped at the hardware limit of 8
fn hot_cues(cues: &[CuePoint]) -> Vec<&CuePoint> {
    let mut slotted: Vec<&CuePoint> = cues.iter().filter(|c| c.hot_cue.is_some()).collect();
    slotted.sort_by_key(|c| c.hot_cue);
    if slotted.len() > MAX_HOT_CUES {
        warn!("hot cue list truncated from {} to {} entries", slotted.len(), MAX_HOT_CUES);
        slotted.truncate(MAX_HOT_CUES);
    }
    slotted
}

fn cue_entry_fields(cue: &CuePoint, payload: &mut Vec<u8>) {
    payload.extend_from_slice(&cue_type_code(cue).to_be_bytes());
    payload.extend_from_slice(&(cue.hot_cue.unwrap_or(0) as u16).to_be_bytes());
    payload.extend_from_slice(&cue.start_ms.to_be_bytes());
    payload.extend_from_slice(&cue.end_ms().unwrap_or(NO_LOOP_END).to_be_bytes());
}

/// PCOB: simple hot-cue entries, 12 bytes each
fn hot_cue_section(cues: &[CuePoint]) -> Vec<u8> {
    let slotted = hot_cues(cues);
    let mut payload = Vec::with_capacity(slotted.len() * 12);
    for cue in &slotted {
        cue_entry_fields(cue, &mut payload);
    }
    section(HOT_CUE_TAG, &(slotted.len() as u32).to_be_bytes(), &payload)
}

/// PCO2: extended hot-cue entries with a marker and an RGB color, 20 bytes
fn hot_cue_color_section(cues: &[CuePoint]) -> Vec<u8> {
    let slotted = hot_cues(cues);
    let mut payload = Vec::with_capacity(slotted.len() * 20);
    for cue in &slotted {
        payload.extend_from_slice(&CUE_COLOR_ENTRY_MARKER);
        cue_entry_fields(cue, &mut payload);
        let rgb = cue
            .color
            .as_deref()
            .map(crate::rows::parse_color)
            .unwrap_or(0);
        payload.extend_from_slice(&rgb.to_be_bytes());
    }
    section(HOT_CUE_COLOR_TAG, &(slotted.len() as u32).to_be_bytes(), &payload)
}

/// Build one complete analysis file
///
/// The primary variant carries the mono waveform and simple cues, the
/// extended variant the color waveform and colored cues. Both always
/// contain the path and beatgrid sections, placeholder or not, and the
/// result is structurally valid even with no analysis input at all.
pub fn build_analysis_file(
    variant: AnalysisVariant,
    audio_device_path: &str,
    analysis: &TrackAnalysis,
    cues: &[CuePoint],
) -> Vec<u8> {
    let mut sections: Vec<Vec<u8>> = vec![path_section(audio_device_path)];
    sections.push(beatgrid_section(&analysis.beats));
    match variant {
        AnalysisVariant::Primary => {
            sections.push(mono_waveform_section(&analysis.amplitude));
            sections.push(hot_cue_section(cues));
        }
        AnalysisVariant::Extended => {
            sections.push(color_waveform_section(&analysis.bands, &analysis.amplitude));
            sections.push(hot_cue_color_section(cues));
        }
    }

    let total_len =
        CONTAINER_HEADER_LEN + sections.iter().map(Vec::len).sum::<usize>();
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(CONTAINER_TAG);
    out.extend_from_slice(&(CONTAINER_HEADER_LEN as u32).to_be_bytes());
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(&[0u8; 8]);
    for sec in &sections {
        out.extend_from_slice(sec);
    }
    out
}
