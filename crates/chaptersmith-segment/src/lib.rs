//! Chaptersmith Segment — the chapter segmentation engine.
//!
//! Splits a serialized novel file into an exact number of chapters: an
//! oracle-inferred header pattern drives a first regex split, and a ladder
//! of recovery stages (deterministic pattern repair, gap-directed
//! refinement, direct title search, structural analysis with AI-scored
//! global boundary optimization) reconciles the result against the
//! caller's expected count.

pub mod boundary;
pub mod chapter;
pub mod encoding;
pub mod log;
pub mod optimizer;
pub mod pattern;
pub mod runner;
pub mod sampler;
pub mod scorer;
pub mod source;
pub mod splitter;
pub mod structural;
pub mod topic;

pub use boundary::{Boundary, BoundarySource, Candidate};
pub use chapter::{Chapter, ChapterType};
pub use log::{ReconcileEvent, ReconciliationLog, Stage};
pub use runner::{Segmentation, SegmentationFailure, SplitRunner};
pub use source::{SourceFile, SourceLine};
