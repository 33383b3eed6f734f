//! Device path resolution
//!
//! Both writers depend on the same resolver: the database embeds the
//! analysis-file path in every track row, and the analysis writer must
//! produce the file at exactly that location, so the string is computed in
//! one place only. Paths are device-absolute with forward slashes.

/// Vendor directory holding per-track analysis files
pub const ANALYSIS_DIR: &str = "PIONEER/USBANLZ";

/// Directory holding the device database
pub const DATABASE_DIR: &str = "PIONEER/rekordbox";

/// Primary database filename
pub const DATABASE_FILE: &str = "export.pdb";

/// Alternate-name copy some players probe for during device scan
pub const SECONDARY_DATABASE_PATH: &str = "PIONEER/EXPORT.PDB";

/// Directory holding the renamed audio files
pub const CONTENTS_DIR: &str = "Contents";

/// Longest sanitized filename stem written under Contents
const MAX_STEM_LEN: usize = 48;

/// Analysis file variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisVariant {
    /// Beatgrid, mono waveform, simple cues (.DAT)
    Primary,
    /// Color waveform and extended cues (.EXT)
    Extended,
}

impl AnalysisVariant {
    pub fn extension(self) -> &'static str {
        match self {
            AnalysisVariant::Primary => "DAT",
            AnalysisVariant::Extended => "EXT",
        }
    }
}

/// Device path of a track's analysis file
///
/// Flat layout: the vendor analysis directory plus a six-digit
/// zero-padded track id and the variant extension.
pub fn analysis_path(track_id: u32, variant: AnalysisVariant) -> String {
    format!("/{}/ANLZ{:06}.{}", ANALYSIS_DIR, track_id, variant.extension())
}

/// Device path of a track's audio file under Contents
///
/// The filename is rebuilt from the source name: ASCII-only, length
/// limited, and prefixed with the track id so two sources with the same
/// name never collide.
pub fn contents_path(track_id: u32, source_path: &str) -> String {
    let name = source_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_path);

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    };

    let stem = sanitize(stem, MAX_STEM_LEN);
    let ext = sanitize(&ext.to_ascii_lowercase(), 8);

    if ext.is_empty() {
        format!("/{}/{:06}_{}", CONTENTS_DIR, track_id, stem)
    } else {
        format!("/{}/{:06}_{}.{}", CONTENTS_DIR, track_id, stem, ext)
    }
}

/// Strip the leading slash so a device path can be joined to a local root
pub fn relative(device_path: &str) -> &str {
    device_path.strip_prefix('/').unwrap_or(device_path)
}

/// Map a name component to safe ASCII, capped at `max_len` bytes
fn sanitize(part: &str, max_len: usize) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect()
}
