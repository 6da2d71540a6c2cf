use std::collections::BTreeSet;
use std::path::PathBuf;

/// Version string stored when a package manifest does not declare one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Source dialect of the buffer handed to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Javascript,
    Typescript,
    Vue,
    Svelte,
    /// Anything else. Extraction yields no declarations.
    Unknown,
}

impl Language {
    /// Infer the dialect from a file extension, as editors do for untitled
    /// buffers saved to disk.
    pub fn from_extension(ext: &str) -> Language {
        match ext {
            "ts" | "tsx" | "mts" | "cts" => Language::Typescript,
            "js" | "jsx" | "mjs" | "cjs" => Language::Javascript,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            _ => Language::Unknown,
        }
    }
}

/// A single external import found in a source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    /// The module specifier as written (`chai`, `@scope/pkg`, `chai/abc`).
    pub name: String,
    /// 1-based line number in the original source.
    pub line: usize,
    /// Canonical re-materialized import statement. Declarations importing the
    /// same specifier with the same binding set share this string regardless
    /// of binding order or require/import syntax.
    pub string: String,
    /// Absolute path of the containing source file.
    pub file_name: PathBuf,
}

impl ImportDeclaration {
    /// Top-level package name of the specifier: `chai` from `chai/abc`,
    /// `@scope/pkg` from `@scope/pkg/sub`.
    pub fn package_name(&self) -> &str {
        package_name_of(&self.name)
    }
}

pub(crate) fn package_name_of(specifier: &str) -> &str {
    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some(i) => &specifier[..i],
        None => specifier,
    }
}

/// Installed-package metadata the sizer needs to bundle one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// Absolute path of the resolved package root inside `node_modules`.
    pub directory: PathBuf,
    /// Declared version, or [`UNKNOWN_VERSION`].
    pub version: String,
    /// Specifiers to mark external during bundling.
    pub peer_dependencies: BTreeSet<String>,
    /// Keys of the package's declared externals map, also marked external.
    pub main_externals: BTreeSet<String>,
}
