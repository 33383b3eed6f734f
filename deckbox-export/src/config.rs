//! Export run configuration

use std::path::PathBuf;

use deckbox_core::page::DEFAULT_PAGE_SIZE;

/// Everything one export run needs to know
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Path to the collection JSON file
    pub collection: PathBuf,
    /// Directory searched for audio files referenced by the collection
    pub source_dir: Option<PathBuf>,
    /// Device root the export is written under
    pub output_dir: PathBuf,
    /// Database page size in bytes
    pub page_size: usize,
    /// Also write extended (.EXT) analysis files
    pub extended_analysis: bool,
    /// Also write the alternate-name database copy at PIONEER/EXPORT.PDB
    pub secondary_database: bool,
}

impl ExportConfig {
    pub fn new(collection: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            collection,
            source_dir: None,
            output_dir,
            page_size: DEFAULT_PAGE_SIZE,
            extended_analysis: false,
            secondary_database: false,
        }
    }
}
