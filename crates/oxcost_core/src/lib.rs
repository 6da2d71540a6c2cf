//! Core analysis for oxcost.
//!
//! This crate provides the pure, stateless half of the import-cost pipeline:
//! - Extracting import declarations from JS/TS/Vue/Svelte buffers
//! - Canonicalizing each declaration into a bundler-ready entry statement
//! - Fingerprinting a buffer's imports order-independently
//! - Resolving specifiers against the installed `node_modules` layout

mod constants;
mod extractor;
mod fingerprint;
mod resolver;
mod script_block;
mod types;

// Re-export public API
pub use constants::NODE_BUILTINS;
pub use extractor::{ExtractError, extract};
pub use fingerprint::fingerprint;
pub use resolver::resolve_package;
pub use types::{ImportDeclaration, Language, PackageInfo, UNKNOWN_VERSION};
