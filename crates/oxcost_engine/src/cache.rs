use dashmap::DashMap;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) const CACHE_SCHEMA: u32 = 1;
const CACHE_FILE: &str = "size-cache-v1.json";

/// One measured result. `size == 0` is the sentinel for "bundling produced
/// no measurable output" and is reported, not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeResult {
    pub size: u64,
    pub gzip: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskCache {
    schema: u32,
    runtime_version: String,
    bundler_version: String,
    entries: HashMap<String, SizeResult>,
}

/// Two-tier size cache: an in-memory concurrent map backed by one on-disk
/// JSON file.
///
/// The disk file carries a `{schema, runtime_version, bundler_version}`
/// header; any mismatch treats the file as empty, so a bundler or engine
/// upgrade never serves stale measurements. Lookups that miss in memory
/// re-read the disk file, which tolerates the file being renamed away and
/// back mid-process. The file is rewritten (memory overlaid on disk, via a
/// temp file rename) after each successful store.
pub(crate) struct SizeCache {
    entries: DashMap<String, SizeResult>,
    file: PathBuf,
    runtime_version: String,
    bundler_version: String,
    disk: Mutex<()>,
}

impl SizeCache {
    pub fn new(cache_dir: &Path, bundler_version: &str) -> Self {
        if let Err(e) = fs::create_dir_all(cache_dir) {
            warn!("Failed to create cache directory {}: {}", cache_dir.display(), e);
        }
        Self {
            entries: DashMap::new(),
            file: cache_dir.join(CACHE_FILE),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            bundler_version: bundler_version.to_string(),
            disk: Mutex::new(()),
        }
    }

    /// Structural cache key: package identity plus import shape. Object
    /// identity never participates.
    pub fn key(package: &str, version: &str, canonical: &str) -> String {
        format!("{package}@{version}::{canonical}")
    }

    pub fn get(&self, key: &str) -> Option<SizeResult> {
        if let Some(hit) = self.entries.get(key) {
            trace!("Size cache hit (memory): {}", key);
            return Some(*hit);
        }
        // Miss: rehydrate from disk. The file may have reappeared or been
        // written by an earlier process since the last look.
        let disk_entries = self.load_disk()?;
        for (k, v) in &disk_entries {
            self.entries.insert(k.clone(), *v);
        }
        let hit = disk_entries.get(key).copied();
        if hit.is_some() {
            trace!("Size cache hit (disk): {}", key);
        }
        hit
    }

    /// Last writer wins; concurrent stores for one key are idempotent in
    /// normal operation because both writers measured the same bundle.
    pub fn store(&self, key: String, result: SizeResult) {
        debug!("Caching {} -> {} bytes ({} gzipped)", key, result.size, result.gzip);
        self.entries.insert(key, result);
        self.persist();
    }

    /// Empty the in-memory tier only. Disk state survives and rehydrates on
    /// the next miss.
    pub fn clear_memory(&self) {
        debug!("Clearing {} in-memory size cache entries", self.entries.len());
        self.entries.clear();
    }

    fn load_disk(&self) -> Option<HashMap<String, SizeResult>> {
        let txt = fs::read_to_string(&self.file).ok()?;
        let disk: DiskCache = match serde_json::from_str(&txt) {
            Ok(d) => d,
            Err(e) => {
                warn!("Discarding corrupt size cache {}: {}", self.file.display(), e);
                return None;
            }
        };
        if disk.schema != CACHE_SCHEMA
            || disk.runtime_version != self.runtime_version
            || disk.bundler_version != self.bundler_version
        {
            debug!(
                "Discarding size cache with stale header (schema {}, runtime {}, bundler {})",
                disk.schema, disk.runtime_version, disk.bundler_version
            );
            return None;
        }
        Some(disk.entries)
    }

    fn persist(&self) {
        let _guard = self.disk.lock().expect("size cache disk lock poisoned");

        // Overlay memory on whatever is on disk so clearing the in-memory
        // tier never loses persisted results.
        let mut entries = self.load_disk().unwrap_or_default();
        for kv in self.entries.iter() {
            entries.insert(kv.key().clone(), *kv.value());
        }

        let disk = DiskCache {
            schema: CACHE_SCHEMA,
            runtime_version: self.runtime_version.clone(),
            bundler_version: self.bundler_version.clone(),
            entries,
        };
        let payload = match serde_json::to_string(&disk) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize size cache: {}", e);
                return;
            }
        };
        let tmp = self.file.with_extension("json.tmp");
        let result = fs::write(&tmp, payload).and_then(|()| fs::rename(&tmp, &self.file));
        if let Err(e) = result {
            warn!("Failed to persist size cache {}: {}", self.file.display(), e);
        }
    }
}
