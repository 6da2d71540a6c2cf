use log::{debug, trace};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::types::{ImportDeclaration, PackageInfo, UNKNOWN_VERSION};

/// Locate the installed package behind a declaration.
///
/// Walks upward from the importing file's directory checking
/// `node_modules/<top-level-name>` at each level, so deeply nested
/// workspaces and hoisted installs both resolve. The first directory whose
/// name matches is terminal: a missing or malformed manifest there yields
/// `None` rather than falling through to a more distant installation.
/// `None` means the package is not installed and the declaration is
/// dropped from all later stages.
pub fn resolve_package(declaration: &ImportDeclaration) -> Option<PackageInfo> {
    let pkg = declaration.package_name();
    trace!(
        "Resolving '{}' from {}",
        pkg,
        declaration.file_name.display()
    );

    let mut current = declaration.file_name.parent();
    while let Some(dir) = current {
        let candidate = dir.join("node_modules").join(pkg);
        if candidate.is_dir() {
            let info = read_manifest(&candidate);
            match &info {
                Some(info) => debug!("Resolved '{}' to {}", pkg, info.directory.display()),
                None => debug!("Unreadable manifest for '{}' at {}", pkg, candidate.display()),
            }
            return info;
        }
        current = dir.parent();
    }

    trace!("Package '{}' is not installed", pkg);
    None
}

fn read_manifest(package_dir: &Path) -> Option<PackageInfo> {
    let manifest_path = package_dir.join("package.json");
    let txt = match fs::read_to_string(&manifest_path) {
        Ok(txt) => txt,
        Err(_) => {
            trace!("No manifest at {}", manifest_path.display());
            return None;
        }
    };
    let manifest: serde_json::Value = match serde_json::from_str(&txt) {
        Ok(v) => v,
        Err(e) => {
            trace!("Malformed manifest at {}: {}", manifest_path.display(), e);
            return None;
        }
    };

    let version = manifest
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or(UNKNOWN_VERSION)
        .to_string();

    let peer_dependencies = manifest
        .get("peerDependencies")
        .and_then(|v| v.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();

    Some(PackageInfo {
        directory: package_dir.to_path_buf(),
        version,
        peer_dependencies,
        main_externals: externals_of(&manifest),
    })
}

/// Keys of the declared externals map. Packages declare this as an object,
/// an array, or a single string.
fn externals_of(manifest: &serde_json::Value) -> BTreeSet<String> {
    match manifest.get("externals") {
        Some(serde_json::Value::Object(m)) => m.keys().cloned().collect(),
        Some(serde_json::Value::Array(items)) => {
            items.iter().filter_map(|v| v.as_str().map(String::from)).collect()
        }
        Some(serde_json::Value::String(s)) => BTreeSet::from([s.clone()]),
        _ => BTreeSet::new(),
    }
}
