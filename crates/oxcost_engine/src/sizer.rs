use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, trace, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

use oxcost_core::{ImportDeclaration, NODE_BUILTINS, PackageInfo};

use crate::cache::SizeResult;
use crate::registry::CancellationToken;

/// How often an in-flight bundler subprocess is re-checked for exit,
/// cancellation, and deadline expiry.
const POLL_SLICE: Duration = Duration::from_millis(25);

/// Cap on the stderr excerpt carried in a bundle failure.
const MAX_ERROR_LEN: usize = 300;

#[derive(Debug)]
pub(crate) enum SizerOutcome {
    Sized(SizeResult),
    TimedOut { timeout_ms: u64 },
    Failed { message: String },
    Cancelled,
}

/// Measures one import by bundling a synthetic entry in production mode.
///
/// Each call gets a unique ephemeral working directory containing an entry
/// file whose body is exactly the declaration's canonical string. The
/// bundler runs minified with `NODE_ENV=production` and with peer
/// dependencies, declared externals, and node built-ins marked external, so
/// only the package's own bytes are measured. The working directory is
/// removed on every exit path.
pub(crate) struct BundleSizer {
    bundler: PathBuf,
    version: OnceLock<String>,
}

impl BundleSizer {
    pub fn new(bundler: PathBuf) -> Self {
        Self { bundler, version: OnceLock::new() }
    }

    /// Probe the bundler version once; feeds the cache file header.
    pub fn bundler_version(&self) -> &str {
        self.version.get_or_init(|| {
            let output = Command::new(&self.bundler).arg("--version").output();
            match output {
                Ok(out) if out.status.success() => {
                    String::from_utf8_lossy(&out.stdout).trim().to_string()
                }
                _ => {
                    warn!("Could not probe bundler version from {}", self.bundler.display());
                    "unknown".to_string()
                }
            }
        })
    }

    pub fn size(
        &self,
        declaration: &ImportDeclaration,
        package: &PackageInfo,
        deadline: Option<Duration>,
        token: &CancellationToken,
    ) -> SizerOutcome {
        let workdir = match tempfile::Builder::new().prefix("oxcost-").tempdir() {
            Ok(d) => d,
            Err(e) => return SizerOutcome::Failed { message: format!("workdir: {e}") },
        };
        let entry = workdir.path().join("entry.js");
        let bundle = workdir.path().join("bundle.js");
        if let Err(e) = fs::write(&entry, &declaration.string) {
            return SizerOutcome::Failed { message: format!("entry file: {e}") };
        }

        trace!("Sizing '{}' in {}", declaration.name, workdir.path().display());

        let mut cmd = Command::new(&self.bundler);
        cmd.arg(&entry)
            .arg("--bundle")
            .arg("--minify")
            .arg(format!("--outfile={}", bundle.display()))
            .arg("--log-level=error")
            .arg("--define:process.env.NODE_ENV=\"production\"")
            .env("NODE_ENV", "production")
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        for external in externals_for(package) {
            cmd.arg(format!("--external:{external}"));
        }
        if let Some(node_path) = node_modules_root(&package.directory) {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return SizerOutcome::Failed {
                    message: format!("failed to spawn {}: {e}", self.bundler.display()),
                };
            }
        };
        let stderr_thread = spawn_capture_thread(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            if token.is_cancelled() {
                trace!("Sizing of '{}' cancelled", declaration.name);
                reap(&mut child, stderr_thread);
                return SizerOutcome::Cancelled;
            }
            if let Some(limit) = deadline
                && started.elapsed() >= limit
            {
                debug!("Sizing of '{}' exceeded {}ms", declaration.name, limit.as_millis());
                reap(&mut child, stderr_thread);
                return SizerOutcome::TimedOut { timeout_ms: limit.as_millis() as u64 };
            }
            match child.wait_timeout(POLL_SLICE) {
                Ok(Some(status)) => break status,
                Ok(None) => continue,
                Err(e) => {
                    reap(&mut child, stderr_thread);
                    return SizerOutcome::Failed { message: format!("wait: {e}") };
                }
            }
        };

        let stderr = join_capture_thread(stderr_thread);
        if !status.success() {
            let message = truncate(String::from_utf8_lossy(&stderr).trim());
            debug!("Bundler failed for '{}': {}", declaration.name, message);
            return SizerOutcome::Failed { message };
        }

        let bytes = match fs::read(&bundle) {
            Ok(b) => b,
            Err(_) => {
                return SizerOutcome::Failed { message: "bundler produced no output".to_string() };
            }
        };
        let size = bytes.len() as u64;
        let gzip = match gzip_len(&bytes) {
            Ok(g) => g,
            Err(e) => return SizerOutcome::Failed { message: format!("gzip: {e}") },
        };
        debug!("Sized '{}': {} bytes ({} gzipped)", declaration.name, size, gzip);
        SizerOutcome::Sized(SizeResult { size, gzip })
    }
}

/// Union of peer dependencies, declared externals, and node built-ins
/// (bare and `node:`-prefixed), deduplicated and in stable order.
fn externals_for(package: &PackageInfo) -> Vec<String> {
    let mut set: BTreeSet<String> = BTreeSet::new();
    set.extend(package.peer_dependencies.iter().cloned());
    set.extend(package.main_externals.iter().cloned());
    for builtin in NODE_BUILTINS {
        set.insert((*builtin).to_string());
        set.insert(format!("node:{builtin}"));
    }
    set.into_iter().collect()
}

/// Nearest ancestor directory named `node_modules`; handed to the bundler
/// as `NODE_PATH` so the entry resolves packages from the project that owns
/// them, scoped packages included.
fn node_modules_root(package_dir: &Path) -> Option<PathBuf> {
    package_dir
        .ancestors()
        .find(|a| a.file_name().is_some_and(|n| n == "node_modules"))
        .map(Path::to_path_buf)
}

fn spawn_capture_thread(
    reader: Option<impl std::io::Read + Send + 'static>,
) -> Option<JoinHandle<Vec<u8>>> {
    reader.map(|mut r| {
        std::thread::spawn(move || {
            let mut buf: Vec<u8> = vec![];
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_capture_thread(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn reap(child: &mut Child, stderr_thread: Option<JoinHandle<Vec<u8>>>) {
    let _ = child.kill();
    let _ = child.wait();
    let _ = join_capture_thread(stderr_thread);
}

fn truncate(message: &str) -> String {
    if message.is_empty() {
        return "bundler exited with a failure status".to_string();
    }
    let mut out: String = message.chars().take(MAX_ERROR_LEN).collect();
    if out.len() < message.len() {
        out.push_str("...");
    }
    out
}

fn gzip_len(bytes: &[u8]) -> std::io::Result<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn declaration(dir: &Path) -> ImportDeclaration {
        ImportDeclaration {
            name: "chai".to_string(),
            line: 1,
            string: "import _default from \"chai\"; console.log(_default);".to_string(),
            file_name: dir.join("src/index.js"),
        }
    }

    fn package(dir: &Path) -> PackageInfo {
        PackageInfo {
            directory: dir.join("node_modules/chai"),
            version: "4.3.7".to_string(),
            ..PackageInfo::default()
        }
    }

    #[cfg(unix)]
    fn write_stub_bundler(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("esbuild-stub");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 0.0.0-stub; exit 0; fi\n\
             out=\"\"\nfor a in \"$@\"; do case \"$a\" in --outfile=*) out=\"${{a#--outfile=}}\";; esac; done\n{body}\n"
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_gzip_len_is_smaller_for_repetitive_input() {
        let bytes = vec![b'a'; 10000];
        let gz = gzip_len(&bytes).unwrap();
        assert!(gz > 0);
        assert!(gz < bytes.len() as u64);
    }

    #[test]
    fn test_externals_include_builtins_and_peers() {
        let mut info = PackageInfo::default();
        info.peer_dependencies.insert("react".to_string());
        info.main_externals.insert("jquery".to_string());
        let externals = externals_for(&info);
        assert!(externals.contains(&"react".to_string()));
        assert!(externals.contains(&"jquery".to_string()));
        assert!(externals.contains(&"fs".to_string()));
        assert!(externals.contains(&"node:fs".to_string()));
    }

    #[test]
    fn test_node_modules_root() {
        let root = node_modules_root(Path::new("/proj/node_modules/@scope/pkg")).unwrap();
        assert_eq!(root, PathBuf::from("/proj/node_modules"));
        assert!(node_modules_root(Path::new("/proj/src")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_sizing_with_stub_bundler() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub_bundler(
            dir.path(),
            "head -c 12000 /dev/zero | tr '\\0' 'a' > \"$out\"",
        );
        let sizer = BundleSizer::new(stub);
        let outcome = sizer.size(
            &declaration(dir.path()),
            &package(dir.path()),
            None,
            &CancellationToken::default(),
        );
        match outcome {
            SizerOutcome::Sized(r) => {
                assert_eq!(r.size, 12000);
                assert!(r.gzip > 0 && r.gzip <= r.size);
            }
            other => panic!("expected sized outcome, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_bundler_failure_is_soft() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub_bundler(dir.path(), "echo 'could not resolve' >&2; exit 1");
        let sizer = BundleSizer::new(stub);
        let outcome = sizer.size(
            &declaration(dir.path()),
            &package(dir.path()),
            None,
            &CancellationToken::default(),
        );
        match outcome {
            SizerOutcome::Failed { message } => assert!(message.contains("could not resolve")),
            other => panic!("expected failed outcome, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_deadline_expiry_times_out() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub_bundler(dir.path(), "sleep 5; : > \"$out\"");
        let sizer = BundleSizer::new(stub);
        let started = Instant::now();
        let outcome = sizer.size(
            &declaration(dir.path()),
            &package(dir.path()),
            Some(Duration::from_millis(100)),
            &CancellationToken::default(),
        );
        assert!(started.elapsed() < Duration::from_secs(3));
        match outcome {
            SizerOutcome::TimedOut { timeout_ms } => assert_eq!(timeout_ms, 100),
            other => panic!("expected timeout outcome, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cancellation_kills_subprocess() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub_bundler(dir.path(), "sleep 5; : > \"$out\"");
        let sizer = BundleSizer::new(stub);
        let token = CancellationToken::default();

        let cancel = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });

        let started = Instant::now();
        let outcome =
            sizer.size(&declaration(dir.path()), &package(dir.path()), None, &token);
        canceller.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(outcome, SizerOutcome::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn test_bundler_version_probe() {
        let dir = TempDir::new().unwrap();
        let stub = write_stub_bundler(dir.path(), ": > \"$out\"");
        let sizer = BundleSizer::new(stub);
        assert_eq!(sizer.bundler_version(), "0.0.0-stub");
    }

    #[test]
    fn test_missing_bundler_version_is_unknown() {
        let sizer = BundleSizer::new(PathBuf::from("/nonexistent/esbuild"));
        assert_eq!(sizer.bundler_version(), "unknown");
    }
}
