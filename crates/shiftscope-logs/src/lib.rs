//! Log aggregation for shiftscope
//!
//! This crate provides line parsing, filtering, the per-backend log source
//! adapters and the engine that fans a query out across them.

mod adapters;
mod diagnostics;
mod engine;
mod filter;
mod parser;
mod window;

pub use adapters::{Adapters, Batch, FetchUnit, InvolvedFilter, SourceError};
pub use diagnostics::{Diagnostics, Snapshot};
pub use engine::{DEFAULT_MAX_LINES, EngineConfig, LogSearchEngine, LogTarget, SearchRequest};
pub use filter::{CompiledFilter, QueryMode};
pub use parser::{LogParser, ParsedLine};
pub use window::{merge, window};

// Re-export types used in our public API
pub use shiftscope_types::{LevelCounts, LogEntry, LogLevel, SearchResult, SourceKind};
