//! Chaptersmith Core — error kinds, result alias, run configuration.

pub mod config;
pub mod error;

pub use config::{MetadataHints, SegmentConfig};
pub use error::{Error, Result};
