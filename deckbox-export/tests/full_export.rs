//! End-to-end export over a small collection

use std::fs;

use tempfile::TempDir;

use deckbox_export::{collection, export, ExportConfig, MetadataSource};

const COLLECTION_JSON: &str = r##"{
    "tracks": [
        {
            "title": "Opening Theme",
            "artist": "First Artist",
            "album": "Night Album",
            "genre": "Techno",
            "file_path": "REPLACED_BY_TEST",
            "duration_secs": 372.5,
            "bpm": 128.0,
            "key": "8A",
            "rating": 255,
            "cues": [
                {"start_ms": 5000, "length_ms": 4000, "kind": "loop"}
            ]
        },
        {
            "title": "Peak Time",
            "artist": "Second Artist",
            "file_path": "/library/missing/peak.mp3",
            "duration_secs": 410.0,
            "bpm": 132.0,
            "cues": [
                {"start_ms": 60000, "kind": "position", "hot_cue": 1, "color": "#FF0000"}
            ]
        },
        {
            "title": "Ambient Closer",
            "artist": "First Artist",
            "file_path": "/library/missing/closer.flac",
            "duration_secs": 533.0
        }
    ],
    "playlists": [
        {"type": "playlist", "name": "Main Set", "tracks": [0, 1, 2]}
    ]
}"##;

fn read_u32_be(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[test]
fn test_full_export() {
    let library = TempDir::new().unwrap();
    let audio = library.path().join("opening.mp3");
    fs::write(&audio, vec![0u8; 2048]).unwrap();

    let json = COLLECTION_JSON.replace("REPLACED_BY_TEST", audio.to_str().unwrap());
    let collection_path = library.path().join("collection.json");
    fs::write(&collection_path, json).unwrap();

    let out = TempDir::new().unwrap();
    let mut config = ExportConfig::new(collection_path, out.path().to_path_buf());
    config.extended_analysis = true;

    let tracks = collection::load(&config.collection).unwrap().tracks;
    let summary = export(&config, &tracks, &MetadataSource).unwrap();

    assert_eq!(summary.tracks_exported, 3);
    assert_eq!(summary.cue_rows, 2);
    assert_eq!(summary.analysis_files, 6);
    // Third track has no tagged BPM, so it fell back to the placeholder
    assert_eq!(summary.placeholder_tracks, 1);
    assert_eq!(summary.audio_copied, 1);
    assert_eq!(summary.audio_missing, 2);

    // Database exists, is page aligned, and declares its page size
    let pdb = fs::read(out.path().join("PIONEER/rekordbox/export.pdb")).unwrap();
    assert_eq!(pdb.len() as u64, summary.database_bytes);
    assert_eq!(pdb.len() % 4096, 0);
    assert_eq!(u32::from_le_bytes([pdb[4], pdb[5], pdb[6], pdb[7]]), 4096);

    // One analysis file pair per track, named by track id
    for id in 1..=3 {
        for ext in ["DAT", "EXT"] {
            let path = out
                .path()
                .join(format!("PIONEER/USBANLZ/ANLZ{:06}.{}", id, ext));
            let data = fs::read(&path).unwrap();
            assert_eq!(&data[0..4], b"PMAI", "bad container in {:?}", path);
            assert_eq!(read_u32_be(&data, 8) as usize, data.len());
        }
    }

    // The copied audio file landed under its renamed Contents path
    let copied = out.path().join("Contents/000001_opening.mp3");
    assert_eq!(fs::metadata(copied).unwrap().len(), 2048);

    // Reruns over the same input produce a byte-identical database
    let out2 = TempDir::new().unwrap();
    let mut config2 = config.clone();
    config2.output_dir = out2.path().to_path_buf();
    export(&config2, &tracks, &MetadataSource).unwrap();
    let pdb2 = fs::read(out2.path().join("PIONEER/rekordbox/export.pdb")).unwrap();
    assert_eq!(pdb, pdb2);
}
