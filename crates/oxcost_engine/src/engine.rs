use log::{debug, info};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use oxcost_core::{
    ExtractError, ImportDeclaration, Language, PackageInfo, extract, fingerprint, resolve_package,
};

use crate::cache::{SizeCache, SizeResult};
use crate::config::{CostConfig, EngineOptions};
use crate::error::{CostError, EntryError};
use crate::events::{CostEmitter, EventSink, PackageEntry};
use crate::registry::{CancellationToken, DebounceRegistry};
use crate::sizer::{BundleSizer, SizerOutcome};

/// The import-cost engine: one instance per process, shared across editor
/// buffers. Owns the debounce registry, the two-tier size cache, and the
/// bundler configuration.
pub struct CostEngine {
    registry: Arc<DebounceRegistry>,
    cache: Arc<SizeCache>,
    sizer: Arc<BundleSizer>,
}

impl Default for CostEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl CostEngine {
    pub fn new(options: EngineOptions) -> Self {
        let sizer = BundleSizer::new(options.bundler);
        let bundler_version = sizer.bundler_version().to_string();
        info!(
            "Engine ready (bundler {}, cache at {})",
            bundler_version,
            options.cache_dir.display()
        );
        Self {
            registry: Arc::new(DebounceRegistry::default()),
            cache: Arc::new(SizeCache::new(&options.cache_dir, &bundler_version)),
            sizer: Arc::new(sizer),
        }
    }

    /// Measure every external import of a source buffer.
    ///
    /// Returns immediately with an emitter producing `start`, per-entry
    /// `calculated`, and a terminal `done` or `error`. A call for a file
    /// that already has a request in flight with a different import
    /// fingerprint supersedes that request, which terminates with a
    /// debounce error.
    pub fn import_cost(
        &self,
        file_name: impl Into<PathBuf>,
        source: impl Into<String>,
        language: Language,
        config: CostConfig,
    ) -> CostEmitter {
        let (tx, rx) = mpsc::channel();
        let request = Request {
            file_name: file_name.into(),
            source: source.into(),
            language,
            config,
            registry: Arc::clone(&self.registry),
            cache: Arc::clone(&self.cache),
            sizer: Arc::clone(&self.sizer),
            sink: EventSink::new(tx),
        };
        thread::spawn(move || request.run());
        CostEmitter::new(rx)
    }

    /// Cancel every in-flight request. Sizer subprocesses are killed
    /// cooperatively and their working directories removed; the affected
    /// emitters terminate with a debounce error.
    pub fn cleanup(&self) {
        info!("Engine cleanup requested");
        self.registry.cancel_all();
    }

    /// Empty the in-memory size cache. Disk state survives and rehydrates
    /// on the next miss.
    pub fn clear_size_cache(&self) {
        self.cache.clear_memory();
    }
}

struct Request {
    file_name: PathBuf,
    source: String,
    language: Language,
    config: CostConfig,
    registry: Arc<DebounceRegistry>,
    cache: Arc<SizeCache>,
    sizer: Arc<BundleSizer>,
    sink: EventSink,
}

/// The shareable subset of a request handed to sizing tasks. The event
/// sender travels separately because it is cloned per task.
struct SizingCtx<'a> {
    cache: &'a SizeCache,
    sizer: &'a BundleSizer,
    max_call_time: Option<Duration>,
}

impl Request {
    fn run(self) {
        if self.language == Language::Unknown {
            debug!("Unknown language for {}, nothing to size", self.file_name.display());
            self.sink.done(Vec::new());
            return;
        }

        let declarations = match extract(&self.file_name, &self.source, self.language) {
            Ok(d) => d,
            Err(ExtractError::Parse { file, message }) => {
                self.sink.error(CostError::Parse { file, message });
                return;
            }
        };

        let file_key = self.file_name.display().to_string();
        let digest = fingerprint(&declarations);
        let (token, generation) = self.registry.begin(&file_key, &digest);

        let jobs: Vec<(ImportDeclaration, PackageInfo)> = declarations
            .into_iter()
            .filter_map(|d| match resolve_package(&d) {
                Some(info) => Some((d, info)),
                None => {
                    debug!("Dropping '{}': not installed", d.name);
                    None
                }
            })
            .collect();

        self.sink.start(jobs.iter().map(|(d, _)| unsized_entry(d)).collect());

        let ctx = SizingCtx {
            cache: self.cache.as_ref(),
            sizer: self.sizer.as_ref(),
            max_call_time: self.config.max_call_time,
        };
        let sized: Vec<Option<PackageEntry>> = if self.config.concurrent {
            jobs.par_iter()
                .map_with(self.sink.clone(), |sink, job| size_one(&ctx, job, &token, sink))
                .collect()
        } else {
            jobs.iter().map(|job| size_one(&ctx, job, &token, &self.sink)).collect()
        };

        self.registry.finish(&file_key, generation);
        if token.is_cancelled() {
            self.sink.error(CostError::Debounced { file: file_key });
            return;
        }
        self.sink.done(sized.into_iter().flatten().collect());
    }
}

fn unsized_entry(declaration: &ImportDeclaration) -> PackageEntry {
    PackageEntry {
        name: declaration.name.clone(),
        line: declaration.line,
        string: declaration.string.clone(),
        size: 0,
        gzip: 0,
        error: None,
    }
}

fn size_one(
    ctx: &SizingCtx<'_>,
    (declaration, package): &(ImportDeclaration, PackageInfo),
    token: &CancellationToken,
    sink: &EventSink,
) -> Option<PackageEntry> {
    if token.is_cancelled() {
        return None;
    }

    let key = SizeCache::key(declaration.package_name(), &package.version, &declaration.string);
    let mut entry = unsized_entry(declaration);

    if let Some(hit) = ctx.cache.get(&key) {
        entry.size = hit.size;
        entry.gzip = hit.gzip;
    } else {
        match ctx.sizer.size(declaration, package, ctx.max_call_time, token) {
            SizerOutcome::Sized(result) => {
                ctx.cache.store(key, result);
                entry.size = result.size;
                entry.gzip = result.gzip;
            }
            SizerOutcome::Failed { message } => {
                // Soft failure: the zero-size sentinel is cached so the
                // broken bundle is reported, not retried.
                ctx.cache.store(key, SizeResult { size: 0, gzip: 0 });
                entry.error = Some(EntryError::Bundle { message });
            }
            SizerOutcome::TimedOut { timeout_ms } => {
                // Timeouts depend on the caller's deadline and are never cached
                entry.error = Some(EntryError::Timeout { timeout_ms });
            }
            SizerOutcome::Cancelled => return None,
        }
    }

    if token.is_cancelled() {
        return None;
    }
    sink.calculated(entry.clone());
    Some(entry)
}
