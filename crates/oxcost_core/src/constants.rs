//! Shared constants for extraction and bundling.

/// Node built-in module names. These are always marked external during
/// bundling so runtime-provided modules never count against a measurement.
/// Both the bare name and the `node:`-prefixed form must be excluded.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builtins_sorted_and_unique() {
        let mut sorted = NODE_BUILTINS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, NODE_BUILTINS);
    }

    #[test]
    fn test_node_builtins_cover_common_modules() {
        for name in ["fs", "path", "http", "crypto", "zlib"] {
            assert!(NODE_BUILTINS.contains(&name));
        }
    }
}
