//! Error types for chaptersmith.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad caller input: non-positive expected count, unreadable or empty file.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The decoder could not produce a usable text stream even with the
    /// UTF-8 replacement fallback.
    #[error("Encoding undetermined: {0}")]
    EncodingUndetermined(String),

    /// Initial pattern acquisition failed every attempt to produce a valid
    /// compiling regex.
    #[error("No usable chapter pattern: {0}")]
    PatternUnusable(String),

    /// A boundary-mode split was invoked with a set violating the boundary
    /// invariants. Internal bug class; never caused by external input.
    #[error("Invalid boundary set: {0}")]
    InvalidBoundary(String),

    /// Oracle calls failed past the retry budget.
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The escalation ladder was exhausted without matching the expected
    /// chapter count.
    #[error("Stagnated: produced {got} chapters, expected {expected}")]
    Stagnated { got: usize, expected: usize },

    /// The run exceeded its wall-clock budget.
    #[error("Run exceeded wall-clock budget of {0}s")]
    Timeout(u64),

    /// Cooperative cancellation was requested.
    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, Error>;
