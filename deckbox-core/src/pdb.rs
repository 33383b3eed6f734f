//! Device database generation
//!
//! The database file is a sequence of fixed-size little-endian pages:
//! page 0 carries the file header and table directory, every other page
//! belongs to exactly one table chain. The build is a deterministic
//! pipeline over an immutable snapshot: reference tables first, then one
//! track row per input track followed by its cue rows, then the directory.
//! Identical input produces byte-identical output; nothing here reads a
//! clock or shares state across runs.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::model::Track;
use crate::page::{
    FileHeader, PageAllocator, PageType, TableBuilder, TablePointer, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use crate::path;
use crate::rows::{
    self, TrackRefs, ALBUM_ROW_MAGIC, ARTIST_ROW_MAGIC, GENRE_ROW_MAGIC,
    TRACK_FLAG_HAS_ANALYSIS, TRACK_FLAG_HAS_HOT_CUES,
};

/// A reference table (artists, albums, genres) with ids assigned as a pure
/// function of the sorted, deduplicated name set
///
/// Ids are the 1-based position in sorted order, so they cannot depend on
/// the iteration order of the input collection.
pub struct RefTable {
    names: Vec<String>,
}

impl RefTable {
    pub fn from_names<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let set: BTreeSet<&str> = names.into_iter().filter(|n| !n.is_empty()).collect();
        Self {
            names: set.into_iter().map(String::from).collect(),
        }
    }

    /// Id of a name; 0 for the empty name (no reference)
    ///
    /// A non-empty name that was never assigned an id is an invariant
    /// violation in the build pipeline, not bad user input.
    pub fn id_of(&self, name: &str) -> Result<u16> {
        if name.is_empty() {
            return Ok(0);
        }
        self.names
            .binary_search_by(|probe| probe.as_str().cmp(name))
            .map(|pos| (pos + 1) as u16)
            .map_err(|_| Error::InvalidReference(format!("name {:?} has no assigned id", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| ((i + 1) as u32, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Finished database image with the counts the run summary reports
pub struct Database {
    pub data: Vec<u8>,
    pub page_count: u32,
    pub track_rows: u32,
    pub cue_rows: u32,
}

/// Builds the complete paged database for a collection snapshot
pub struct DatabaseWriter {
    page_size: usize,
}

impl DatabaseWriter {
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    pub fn with_default_page_size() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }

    /// Build the full database file
    ///
    /// Track ids are 1-based input positions; the analysis path embedded in
    /// each track row comes from the shared path resolver and therefore
    /// matches the analysis file written for that track.
    pub fn build(&self, tracks: &[Track]) -> Result<Database> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::Database(format!(
                "page size {} outside supported range {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        let artists = RefTable::from_names(tracks.iter().map(|t| t.artist.as_str()));
        let albums =
            RefTable::from_names(tracks.iter().filter_map(|t| t.album.as_deref()));
        let genres =
            RefTable::from_names(tracks.iter().filter_map(|t| t.genre.as_deref()));

        let mut alloc = PageAllocator::new();

        // Page indices are handed out in build order and the page groups
        // are concatenated in the same order, so a page's index equals its
        // position in the file.
        let mut artist_table = TableBuilder::new(PageType::Artists, self.page_size);
        for (id, name) in artists.iter() {
            artist_table.push_row(&mut alloc, &rows::encode_ref_row(ARTIST_ROW_MAGIC, id, name)?)?;
        }

        let mut album_table = TableBuilder::new(PageType::Albums, self.page_size);
        for (id, name) in albums.iter() {
            album_table.push_row(&mut alloc, &rows::encode_ref_row(ALBUM_ROW_MAGIC, id, name)?)?;
        }

        let mut genre_table = TableBuilder::new(PageType::Genres, self.page_size);
        for (id, name) in genres.iter() {
            genre_table.push_row(&mut alloc, &rows::encode_ref_row(GENRE_ROW_MAGIC, id, name)?)?;
        }

        // The key table is static and unrelated to input content
        let mut key_table = TableBuilder::new(PageType::Keys, self.page_size);
        for (id, name) in rows::key_table() {
            key_table.push_row(&mut alloc, &rows::encode_key_row(id, id, &name)?)?;
        }

        let mut track_table = TableBuilder::new(PageType::Tracks, self.page_size);
        let mut cue_row_bytes: Vec<Vec<u8>> = Vec::new();
        let mut next_cue_id = 1u32;

        for (index, track) in tracks.iter().enumerate() {
            let track_id = (index + 1) as u32;

            let refs = TrackRefs {
                artist_id: artists.id_of(&track.artist)?,
                album_id: albums.id_of(track.album.as_deref().unwrap_or(""))?,
                genre_id: genres.id_of(track.genre.as_deref().unwrap_or(""))?,
                key_id: track.key.as_deref().map(rows::key_id_for).unwrap_or(0),
                artwork_id: 0,
            };

            let mut flags = TRACK_FLAG_HAS_ANALYSIS;
            if track.cues.iter().any(|c| c.hot_cue.is_some()) {
                flags |= TRACK_FLAG_HAS_HOT_CUES;
            }

            let device_path = path::contents_path(track_id, &track.file_path);
            let analyze_path = path::analysis_path(track_id, path::AnalysisVariant::Primary);

            track_table.push_row(
                &mut alloc,
                &rows::encode_track_row(track, track_id, refs, &device_path, &analyze_path, flags)?,
            )?;

            for (seq, cue) in track.cues.iter().enumerate() {
                cue_row_bytes.push(rows::encode_cue_row(cue, next_cue_id, track_id, seq as u32)?);
                next_cue_id += 1;
            }
        }

        let mut cue_table = TableBuilder::new(PageType::Cues, self.page_size);
        for row in &cue_row_bytes {
            cue_table.push_row(&mut alloc, row)?;
        }

        let track_rows = track_table.row_count() as u32;
        let cue_rows = cue_table.row_count() as u32;

        let tables = [
            artist_table,
            album_table,
            genre_table,
            key_table,
            track_table,
            cue_table,
        ];

        let mut pointers: Vec<TablePointer> =
            tables.iter().filter_map(|t| t.table_pointer()).collect();
        pointers.sort_by_key(|p| p.table_type);

        let next_unused = alloc.next_unused();
        let header = FileHeader::new(self.page_size, next_unused, pointers);

        let mut data = header.to_page()?;
        for table in tables {
            for page in table.finalize() {
                data.extend_from_slice(&page);
            }
        }

        debug_assert_eq!(data.len(), next_unused as usize * self.page_size);
        Ok(Database {
            data,
            page_count: next_unused,
            track_rows,
            cue_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CueKind, CuePoint};
    use crate::page::{HEAP_START, NO_NEXT_PAGE};

    fn track(title: &str, artist: &str, album: Option<&str>, genre: Option<&str>) -> Track {
        Track {
            title: title.into(),
            artist: artist.into(),
            album: album.map(String::from),
            genre: genre.map(String::from),
            label: None,
            comment: None,
            file_path: format!("/music/{}.mp3", title),
            file_size: 1_000_000,
            bitrate: 320,
            sample_rate: 44100,
            sample_depth: 16,
            bpm: Some(128.0),
            key: Some("8A".into()),
            gain_db: 0.0,
            duration_secs: 180.0,
            rating: 128,
            track_number: 1,
            disc_number: 1,
            import_date: None,
            release_date: None,
            mix_name: None,
            cues: Vec::new(),
        }
    }

    /// Walk a table chain counting live rows from the packed header field
    fn count_rows(data: &[u8], page_size: usize, first_page: u32) -> u32 {
        let mut total = 0;
        let mut current = first_page;
        while current != NO_NEXT_PAGE {
            let page = &data[current as usize * page_size..][..page_size];
            let packed = (page[24] as u32) | ((page[25] as u32) << 8) | ((page[26] as u32) << 16);
            total += (packed >> 13) & 0x7FF;
            current = u32::from_le_bytes([page[12], page[13], page[14], page[15]]);
        }
        total
    }

    fn pointer_for(data: &[u8], table_type: u32) -> Option<(u32, u32)> {
        let num_tables = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        (0..num_tables as usize).find_map(|i| {
            let entry = &data[28 + i * 16..][..16];
            let ty = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            (ty == table_type).then(|| {
                (
                    u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]),
                    u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]),
                )
            })
        })
    }

    #[test]
    fn test_build_deterministic() {
        let tracks = vec![
            track("One", "A", Some("X"), Some("Techno")),
            track("Two", "B", Some("Y"), None),
        ];
        let writer = DatabaseWriter::with_default_page_size();
        let first = writer.build(&tracks).unwrap();
        let second = writer.build(&tracks).unwrap();
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn test_ref_ids_independent_of_order() {
        let forward = RefTable::from_names(["Alpha", "Gamma", "Beta"]);
        let backward = RefTable::from_names(["Beta", "Alpha", "Gamma", "Alpha"]);

        for name in ["Alpha", "Beta", "Gamma"] {
            assert_eq!(forward.id_of(name).unwrap(), backward.id_of(name).unwrap());
        }
        assert_eq!(forward.id_of("Alpha").unwrap(), 1);
        assert_eq!(forward.id_of("Beta").unwrap(), 2);
        assert_eq!(forward.id_of("Gamma").unwrap(), 3);
    }

    #[test]
    fn test_unassigned_reference_is_fatal() {
        let table = RefTable::from_names(["Known"]);
        assert!(matches!(
            table.id_of("Unknown"),
            Err(Error::InvalidReference(_))
        ));
        assert_eq!(table.id_of("").unwrap(), 0);
    }

    #[test]
    fn test_database_structure() {
        let mut t1 = track("One", "A", Some("X"), Some("Techno"));
        t1.cues.push(CuePoint {
            start_ms: 5000,
            length_ms: Some(4000),
            kind: CueKind::Loop,
            ..Default::default()
        });
        let mut t2 = track("Two", "B", None, None);
        t2.cues.push(CuePoint {
            start_ms: 30_000,
            hot_cue: Some(1),
            ..Default::default()
        });
        let t3 = track("Three", "A", None, None);

        let db = DatabaseWriter::with_default_page_size()
            .build(&[t1, t2, t3])
            .unwrap();

        assert_eq!(db.track_rows, 3);
        assert_eq!(db.cue_rows, 2);
        assert_eq!(db.data.len() % DEFAULT_PAGE_SIZE, 0);
        assert_eq!(db.data.len(), db.page_count as usize * DEFAULT_PAGE_SIZE);

        // Header: signature 0, configured page size
        assert_eq!(u32::from_le_bytes([db.data[0], db.data[1], db.data[2], db.data[3]]), 0);
        assert_eq!(
            u32::from_le_bytes([db.data[4], db.data[5], db.data[6], db.data[7]]),
            DEFAULT_PAGE_SIZE as u32
        );

        // Track table holds 3 rows, cue table 2, keys always 24
        let (tracks_first, _) = pointer_for(&db.data, PageType::Tracks as u32).unwrap();
        assert_eq!(count_rows(&db.data, DEFAULT_PAGE_SIZE, tracks_first), 3);
        let (cues_first, _) = pointer_for(&db.data, PageType::Cues as u32).unwrap();
        assert_eq!(count_rows(&db.data, DEFAULT_PAGE_SIZE, cues_first), 2);
        let (keys_first, _) = pointer_for(&db.data, PageType::Keys as u32).unwrap();
        assert_eq!(count_rows(&db.data, DEFAULT_PAGE_SIZE, keys_first), 24);

        // Albums table only saw one name
        let (albums_first, _) = pointer_for(&db.data, PageType::Albums as u32).unwrap();
        assert_eq!(count_rows(&db.data, DEFAULT_PAGE_SIZE, albums_first), 1);
    }

    #[test]
    fn test_empty_tables_left_out_of_directory() {
        let mut t = track("One", "A", None, None);
        t.album = None;
        t.genre = None;
        let db = DatabaseWriter::with_default_page_size().build(&[t]).unwrap();

        assert!(pointer_for(&db.data, PageType::Albums as u32).is_none());
        assert!(pointer_for(&db.data, PageType::Genres as u32).is_none());
        assert!(pointer_for(&db.data, PageType::Cues as u32).is_none());
        assert!(pointer_for(&db.data, PageType::Artists as u32).is_some());
        assert!(pointer_for(&db.data, PageType::Keys as u32).is_some());
    }

    #[test]
    fn test_oversized_dates_never_abort_the_build() {
        let mut t = track("One", "A", None, None);
        t.import_date = Some("9".repeat(10_000));
        t.release_date = Some("8".repeat(10_000));
        t.comment = Some("c".repeat(10_000));

        let db = DatabaseWriter::with_default_page_size().build(&[t]).unwrap();
        assert_eq!(db.track_rows, 1);
    }

    #[test]
    fn test_track_rows_spill_across_pages() {
        // Long comments force a few hundred bytes per row; enough tracks
        // spill the track table across multiple linked pages
        let tracks: Vec<Track> = (0..64)
            .map(|i| {
                let mut t = track(&format!("Track {:02}", i), "A", None, None);
                t.comment = Some("c".repeat(200));
                t
            })
            .collect();

        let db = DatabaseWriter::with_default_page_size().build(&tracks).unwrap();
        let (first, last) = pointer_for(&db.data, PageType::Tracks as u32).unwrap();
        assert!(last > first, "expected multiple track pages");
        assert_eq!(count_rows(&db.data, DEFAULT_PAGE_SIZE, first), 64);

        // Every page index matches its position in the file
        for page_idx in 1..db.page_count {
            let page = &db.data[page_idx as usize * DEFAULT_PAGE_SIZE..][..DEFAULT_PAGE_SIZE];
            assert_eq!(
                u32::from_le_bytes([page[4], page[5], page[6], page[7]]),
                page_idx
            );
            // Used size stays inside the heap region
            let used = u16::from_le_bytes([page[30], page[31]]) as usize;
            assert!(HEAP_START + used <= DEFAULT_PAGE_SIZE);
        }
    }

    #[test]
    fn test_page_size_parameter_respected() {
        let tracks = vec![track("One", "A", None, None)];
        let db = DatabaseWriter::new(8192).build(&tracks).unwrap();
        assert_eq!(db.data.len() % 8192, 0);
        assert_eq!(
            u32::from_le_bytes([db.data[4], db.data[5], db.data[6], db.data[7]]),
            8192
        );
    }

    #[test]
    fn test_unsupported_page_size_rejected() {
        let tracks = vec![track("One", "A", None, None)];
        for size in [0, 20, 1024, MAX_PAGE_SIZE + 1, 1 << 20] {
            assert!(
                matches!(DatabaseWriter::new(size).build(&tracks), Err(Error::Database(_))),
                "size {} should be rejected",
                size
            );
        }
        assert!(DatabaseWriter::new(MAX_PAGE_SIZE).build(&tracks).is_ok());
    }
}
