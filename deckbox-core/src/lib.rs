//! deckbox-core: CDJ export format structures with write support
//!
//! This crate provides binary serialization for:
//! - export.pdb (paged device database) - little-endian
//! - ANLZ files (.DAT, .EXT) - big-endian
//!
//! All encoders are pure functions of their input: identical collections
//! produce byte-identical output across runs.

pub mod anlz;
pub mod error;
pub mod model;
pub mod page;
pub mod path;
pub mod pdb;
pub mod rows;
pub mod string;

pub use error::{Error, Result};
pub use model::{Beat, Collection, CueKind, CuePoint, PlaylistNode, Track, TrackAnalysis};
pub use path::AnalysisVariant;
pub use pdb::{Database, DatabaseWriter};
