use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Per-request options for [`crate::CostEngine::import_cost`].
#[derive(Debug, Clone, Default)]
pub struct CostConfig {
    /// Run per-import sizer invocations in parallel.
    pub concurrent: bool,
    /// Deadline for a single sizer invocation. `None` means unbounded. On
    /// expiry the entry is reported with a timeout error and zero size.
    pub max_call_time: Option<Duration>,
}

/// Process-wide engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Bundler binary invoked per sizing call.
    pub bundler: PathBuf,
    /// Directory holding the persistent size cache file.
    pub cache_dir: PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let bundler = env::var_os("OXCOST_ESBUILD")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("esbuild"));
        let cache_dir = env::var_os("OXCOST_CACHE_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|d| d.join("oxcost")))
            .unwrap_or_else(|| env::temp_dir().join("oxcost"));
        Self { bundler, cache_dir }
    }
}
