//! Chaptersmith Oracle — the LLM text-generation capability consumed by the
//! segmentation engine, plus the shared request gate and response cache.

pub mod cache;
pub mod gate;
pub mod gemini;
pub mod oracle;
pub mod scripted;

pub use cache::{cache_key, CachedOracle, ResponseCache};
pub use gate::RequestGate;
pub use gemini::GeminiOracle;
pub use oracle::{OracleConfig, TextOracle};
pub use scripted::{FailingOracle, ScriptedOracle};
