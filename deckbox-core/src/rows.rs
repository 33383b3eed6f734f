//! Binary row encoders for the device database tables
//!
//! Every row is a fixed little-endian header (binrw) followed by
//! variable-length strings in database string encoding. String offsets
//! stored in the headers are relative to the row start.
//!
//! Several track-row fields are opaque protocol constants with no known
//! meaning; they are reproduced verbatim on every row because the hardware
//! rejects files where they differ. Keep them as the named constants below
//! so a correction stays in one place.

use std::io::Cursor;

use binrw::{binrw, BinWrite};
use tracing::warn;

use crate::error::Result;
use crate::model::{CueKind, CuePoint, Track};
use crate::string;

/// Row type magics (first two bytes of every row)
pub const TRACK_ROW_MAGIC: u16 = 0x0024;
pub const GENRE_ROW_MAGIC: u16 = 0x0020;
pub const ARTIST_ROW_MAGIC: u16 = 0x0060;
pub const ALBUM_ROW_MAGIC: u16 = 0x0080;
pub const KEY_ROW_MAGIC: u16 = 0x00A0;
pub const CUE_ROW_MAGIC: u16 = 0x0090;

/// Track row version marker
pub const TRACK_ROW_VERSION: u16 = 0x0003;

/// Opaque track-row constants observed in vendor output
pub const TRACK_MARKER_A: u32 = 0x0002_0008;
pub const TRACK_MARKER_B: u16 = 0x0041;

/// Track row flag bits (low byte of the packed flags/sample-rate field)
pub const TRACK_FLAG_HAS_ANALYSIS: u8 = 0x01;
pub const TRACK_FLAG_HAS_HOT_CUES: u8 = 0x02;

/// Cue type codes
pub const CUE_TYPE_POSITION: u16 = 0x0001;
pub const CUE_TYPE_LOOP: u16 = 0x0002;
pub const CUE_TYPE_GRID_ANCHOR: u16 = 0x0003;

/// Fixed track-row header size, including the 21-slot offset table
pub const TRACK_HEADER_LEN: usize = 88;
/// Number of variable string slots trailing a track row
pub const TRACK_STRING_SLOTS: usize = 21;
/// Fixed cue-row header size
pub const CUE_HEADER_LEN: usize = 38;
/// Fixed reference-row header size (artist/album/genre)
pub const REF_HEADER_LEN: usize = 8;
/// Fixed key-row header size (adds the sort sequence)
pub const KEY_HEADER_LEN: usize = 12;

/// Longest string accepted into a row before truncation
///
/// Keeps the worst-case track row (nine populated string slots) under the
/// first-row capacity of a 4096-byte page, so a row insert can never
/// exceed a fresh page.
const MAX_ROW_STRING_BYTES: usize = 256;

/// Track string slot indices (trailer order)
const SLOT_IMPORT_DATE: usize = 10;
const SLOT_RELEASE_DATE: usize = 11;
const SLOT_MIX_NAME: usize = 12;
const SLOT_ANALYZE_PATH: usize = 14;
const SLOT_ANALYZE_DATE: usize = 15;
const SLOT_COMMENT: usize = 16;
const SLOT_TITLE: usize = 17;
const SLOT_FILENAME: usize = 19;
const SLOT_FILE_PATH: usize = 20;

/// Fixed portion of a track row
#[binrw]
#[brw(little)]
struct TrackRowHeader {
    magic: u16,
    version: u16,
    /// Sample rate in the upper 24 bits, flag bits in the low byte
    flags_rate: u32,
    file_size: u32,
    id: u32,
    marker_a: u32,
    marker_b: u16,
    artwork_id: u16,
    artist_id: u16,
    album_id: u16,
    genre_id: u16,
    key_id: u16,
    bitrate: u16,
    track_number: u16,
    disc_number: u16,
    bpm_100: u32,
    duration_secs: u16,
    sample_depth: u8,
    rating: u8,
    string_offsets: [u16; 21],
}

/// Fixed portion of an artist/album/genre row
#[binrw]
#[brw(little)]
struct RefRowHeader {
    magic: u16,
    id: u32,
    name_offset: u16,
}

/// Fixed portion of a key row; the sort sequence orders the key wheel
#[binrw]
#[brw(little)]
struct KeyRowHeader {
    magic: u16,
    id: u32,
    sort_sequence: u32,
    name_offset: u16,
}

/// Fixed portion of a cue row
#[binrw]
#[brw(little)]
struct CueRowHeader {
    magic: u16,
    type_code: u16,
    id: u32,
    track_id: u32,
    start_ms: u32,
    end_ms: u32,
    start_frames: u32,
    end_frames: u32,
    hot_cue: u16,
    color: u32,
    ident_offset: u16,
    comment_offset: u16,
}

/// Resolved reference ids for one track row
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackRefs {
    pub artist_id: u16,
    pub album_id: u16,
    pub genre_id: u16,
    pub key_id: u16,
    pub artwork_id: u16,
}

/// Map a 0-255 source rating to the device's 0-5 scale (floor)
pub fn map_rating(source: u8) -> u8 {
    ((source as u16 * 5) / 255) as u8
}

/// Convert milliseconds to the legacy 75-frames-per-second unit
pub fn ms_to_frames(ms: u32) -> u32 {
    ((ms as u64 * 75) / 1000) as u32
}

/// Parse a cue color from "#RRGGBB", bare hex, or a decimal integer
///
/// Anything unparseable maps to 0 (no color).
pub fn parse_color(color: &str) -> u32 {
    let trimmed = color.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        return u32::from_str_radix(hex, 16).unwrap_or(0) & 0x00FF_FFFF;
    }
    if let Ok(decimal) = trimmed.parse::<u32>() {
        return decimal & 0x00FF_FFFF;
    }
    u32::from_str_radix(trimmed, 16).map(|v| v & 0x00FF_FFFF).unwrap_or(0)
}

/// Clamp a wide value into a narrower row field, warning on loss
fn clamp_u16(value: u64, field: &str) -> u16 {
    if value > u16::MAX as u64 {
        warn!("{} value {} clamped to {}", field, value, u16::MAX);
        u16::MAX
    } else {
        value as u16
    }
}

fn clamp_u32(value: u64, field: &str) -> u32 {
    if value > u32::MAX as u64 {
        warn!("{} value {} clamped to {}", field, value, u32::MAX);
        u32::MAX
    } else {
        value as u32
    }
}

/// Truncate an over-long string at a char boundary, warning on loss
fn clamp_string(value: &str, field: &str) -> String {
    if value.len() <= MAX_ROW_STRING_BYTES {
        return value.to_string();
    }
    let mut end = MAX_ROW_STRING_BYTES;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    warn!(
        "{} truncated from {} to {} bytes",
        field,
        value.len(),
        end
    );
    value[..end].to_string()
}

/// Encode one track row
///
/// `device_path` is where the audio lands on the device (slot 20, with the
/// filename alone in slot 19); `analyze_path` is the path resolver's output
/// for this track's primary analysis file (slot 14).
pub fn encode_track_row(
    track: &Track,
    track_id: u32,
    refs: TrackRefs,
    device_path: &str,
    analyze_path: &str,
    flags: u8,
) -> Result<Vec<u8>> {
    let mut slots: [String; TRACK_STRING_SLOTS] = Default::default();
    slots[SLOT_IMPORT_DATE] =
        clamp_string(track.import_date.as_deref().unwrap_or(""), "import date");
    slots[SLOT_RELEASE_DATE] =
        clamp_string(track.release_date.as_deref().unwrap_or(""), "release date");
    slots[SLOT_MIX_NAME] = clamp_string(track.mix_name.as_deref().unwrap_or(""), "mix name");
    slots[SLOT_ANALYZE_PATH] = analyze_path.to_string();
    // The analysis date mirrors the import date; wall-clock time would
    // break byte-identical reruns.
    slots[SLOT_ANALYZE_DATE] = slots[SLOT_IMPORT_DATE].clone();
    slots[SLOT_COMMENT] = clamp_string(track.comment.as_deref().unwrap_or(""), "comment");
    slots[SLOT_TITLE] = clamp_string(&track.title, "title");
    slots[SLOT_FILENAME] = device_path
        .rsplit('/')
        .next()
        .unwrap_or(device_path)
        .to_string();
    slots[SLOT_FILE_PATH] = device_path.to_string();

    let mut string_offsets = [0u16; TRACK_STRING_SLOTS];
    let mut offset = TRACK_HEADER_LEN;
    for (i, slot) in slots.iter().enumerate() {
        string_offsets[i] = clamp_u16(offset as u64, "string offset");
        offset += string::encoded_len(slot);
    }

    let bpm_100 = track
        .bpm
        .map(|bpm| clamp_u32((bpm * 100.0).round() as u64, "bpm"))
        .unwrap_or(0);

    let header = TrackRowHeader {
        magic: TRACK_ROW_MAGIC,
        version: TRACK_ROW_VERSION,
        flags_rate: (track.sample_rate << 8) | flags as u32,
        file_size: clamp_u32(track.file_size, "file size"),
        id: track_id,
        marker_a: TRACK_MARKER_A,
        marker_b: TRACK_MARKER_B,
        artwork_id: refs.artwork_id,
        artist_id: refs.artist_id,
        album_id: refs.album_id,
        genre_id: refs.genre_id,
        key_id: refs.key_id,
        bitrate: clamp_u16(track.bitrate as u64, "bitrate"),
        track_number: track.track_number,
        disc_number: track.disc_number,
        bpm_100,
        duration_secs: clamp_u16(track.duration_secs as u64, "duration"),
        sample_depth: track.sample_depth,
        rating: map_rating(track.rating),
        string_offsets,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(offset));
    header.write(&mut cursor)?;
    let mut row = cursor.into_inner();
    debug_assert_eq!(row.len(), TRACK_HEADER_LEN);
    for slot in &slots {
        row.extend_from_slice(&string::encode(slot));
    }
    Ok(row)
}

/// Encode an artist, album, or genre row
pub fn encode_ref_row(magic: u16, id: u32, name: &str) -> Result<Vec<u8>> {
    let name = clamp_string(name, "reference name");
    let header = RefRowHeader {
        magic,
        id,
        name_offset: REF_HEADER_LEN as u16,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(REF_HEADER_LEN + string::encoded_len(&name)));
    header.write(&mut cursor)?;
    let mut row = cursor.into_inner();
    row.extend_from_slice(&string::encode(&name));
    Ok(row)
}

/// Encode one row of the static key table
pub fn encode_key_row(id: u32, sort_sequence: u32, name: &str) -> Result<Vec<u8>> {
    let header = KeyRowHeader {
        magic: KEY_ROW_MAGIC,
        id,
        sort_sequence,
        name_offset: KEY_HEADER_LEN as u16,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(KEY_HEADER_LEN + string::encoded_len(name)));
    header.write(&mut cursor)?;
    let mut row = cursor.into_inner();
    row.extend_from_slice(&string::encode(name));
    Ok(row)
}

/// Type code for a cue point
pub fn cue_type_code(cue: &CuePoint) -> u16 {
    match cue.kind {
        CueKind::Loop => CUE_TYPE_LOOP,
        CueKind::GridAnchor => CUE_TYPE_GRID_ANCHOR,
        CueKind::Position => CUE_TYPE_POSITION,
    }
}

/// Encode one cue row
///
/// Start and end are carried both in milliseconds and in the legacy
/// 75 fps frame unit. The identity string keeps cue rows distinguishable
/// to library tools and is derived from the owning track, not a clock.
pub fn encode_cue_row(cue: &CuePoint, cue_id: u32, track_id: u32, seq_in_track: u32) -> Result<Vec<u8>> {
    let end_ms = cue.end_ms().unwrap_or(0);
    let comment = clamp_string(cue.comment.as_deref().unwrap_or(""), "cue comment");
    let ident = format!("{:08x}-{:04x}", track_id, seq_in_track);

    let ident_offset = CUE_HEADER_LEN as u16;
    let comment_offset = ident_offset + string::encoded_len(&ident) as u16;

    let header = CueRowHeader {
        magic: CUE_ROW_MAGIC,
        type_code: cue_type_code(cue),
        id: cue_id,
        track_id,
        start_ms: cue.start_ms,
        end_ms,
        start_frames: ms_to_frames(cue.start_ms),
        end_frames: ms_to_frames(end_ms),
        hot_cue: cue.hot_cue.unwrap_or(0) as u16,
        color: cue.color.as_deref().map(parse_color).unwrap_or(0),
        ident_offset,
        comment_offset,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        CUE_HEADER_LEN + string::encoded_len(&ident) + string::encoded_len(&comment),
    ));
    header.write(&mut cursor)?;
    let mut row = cursor.into_inner();
    debug_assert_eq!(row.len(), CUE_HEADER_LEN);
    row.extend_from_slice(&string::encode(&ident));
    row.extend_from_slice(&string::encode(&comment));
    Ok(row)
}

/// The 24 static key notations: 1A-12A then 1B-12B
pub fn key_table() -> Vec<(u32, String)> {
    let mut keys = Vec::with_capacity(24);
    for (block, suffix) in ["A", "B"].iter().enumerate() {
        for position in 1..=12u32 {
            let id = block as u32 * 12 + position;
            keys.push((id, format!("{}{}", position, suffix)));
        }
    }
    keys
}

/// Id of a tagged key notation in the static table, 0 when unrecognized
pub fn key_id_for(notation: &str) -> u16 {
    let wanted = notation.trim().to_ascii_uppercase();
    key_table()
        .iter()
        .find(|(_, name)| *name == wanted)
        .map(|(id, _)| *id as u16)
        .unwrap_or(0)
}
