//! Bundle sizing engine for oxcost.
//!
//! Takes the declarations produced by `oxcost_core` and answers the actual
//! question: how many bytes does each import add to a production bundle,
//! raw and gzipped. The engine coordinates:
//! - a per-file debounce registry with cooperative cancellation
//! - a two-tier (memory + disk) size cache with version-aware invalidation
//! - bundler subprocess invocations with per-call deadlines
//! - a four-event request lifecycle (`start`/`calculated`/`done`/`error`)

mod cache;
mod config;
mod engine;
mod error;
mod events;
mod registry;
mod sizer;

// Re-export public API
pub use cache::SizeResult;
pub use config::{CostConfig, EngineOptions};
pub use engine::CostEngine;
pub use error::{CostError, CostResult, EntryError};
pub use events::{CostEmitter, CostEvent, PackageEntry};

// Consumers hand the language straight to `import_cost`
pub use oxcost_core::Language;
