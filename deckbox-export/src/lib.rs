//! deckbox-export: turn a collection snapshot into a device export
//!
//! Loads a collection JSON file, acquires per-track analysis through an
//! `AnalysisSource`, and writes the full device layout using the encoders
//! in deckbox-core.

pub mod analyzer;
pub mod collection;
pub mod config;
pub mod export;

pub use analyzer::{AnalysisSource, MetadataSource, NullSource};
pub use config::ExportConfig;
pub use export::{export, RunSummary};
