use std::sync::mpsc::{Receiver, Sender};

use log::trace;

use crate::error::{CostError, CostResult, EntryError};

/// The externally visible record for one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Module specifier as written in the source.
    pub name: String,
    /// 1-based line number of the import.
    pub line: usize,
    /// Canonical import statement used for sizing and cache keys.
    pub string: String,
    /// Minified production bundle size in bytes.
    pub size: u64,
    /// Gzipped size of the same bundle in bytes.
    pub gzip: u64,
    /// Set on per-entry failure (timeout, bundler failure).
    pub error: Option<EntryError>,
}

/// Lifecycle events of one request, in strict order: `Start`, then one
/// `Calculated` per entry, then a terminal `Done` or `Error`.
#[derive(Debug, Clone)]
pub enum CostEvent {
    Start(Vec<PackageEntry>),
    Calculated(PackageEntry),
    Done(Vec<PackageEntry>),
    Error(CostError),
}

/// Receiving half of a request's event stream.
pub struct CostEmitter {
    rx: Receiver<CostEvent>,
}

impl CostEmitter {
    pub(crate) fn new(rx: Receiver<CostEvent>) -> Self {
        Self { rx }
    }

    /// Block for the next event. `None` once the stream has terminated.
    pub fn recv(&self) -> Option<CostEvent> {
        self.rx.recv().ok()
    }

    /// Iterate events until the terminal one.
    pub fn events(&self) -> impl Iterator<Item = CostEvent> + '_ {
        self.rx.iter()
    }

    /// Drain the stream and return the final entry list, or the fatal error.
    pub fn wait(self) -> CostResult<Vec<PackageEntry>> {
        let mut last = Vec::new();
        for event in self.rx.iter() {
            match event {
                CostEvent::Done(entries) => last = entries,
                CostEvent::Error(e) => return Err(e),
                _ => {}
            }
        }
        Ok(last)
    }
}

/// Sending half, cloned into sizer tasks. Consumers may drop their emitter
/// mid-flight, so send failures are ignored.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Sender<CostEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<CostEvent>) -> Self {
        Self { tx }
    }

    pub fn start(&self, entries: Vec<PackageEntry>) {
        trace!("Emitting start with {} entries", entries.len());
        let _ = self.tx.send(CostEvent::Start(entries));
    }

    pub fn calculated(&self, entry: PackageEntry) {
        trace!("Emitting calculated for '{}'", entry.name);
        let _ = self.tx.send(CostEvent::Calculated(entry));
    }

    pub fn done(&self, entries: Vec<PackageEntry>) {
        trace!("Emitting done with {} entries", entries.len());
        let _ = self.tx.send(CostEvent::Done(entries));
    }

    pub fn error(&self, error: CostError) {
        trace!("Emitting error: {}", error);
        let _ = self.tx.send(CostEvent::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn entry(name: &str) -> PackageEntry {
        PackageEntry {
            name: name.to_string(),
            line: 1,
            string: format!("import \"{name}\";"),
            size: 0,
            gzip: 0,
            error: None,
        }
    }

    #[test]
    fn test_wait_returns_done_entries() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        sink.start(vec![entry("chai")]);
        sink.calculated(entry("chai"));
        sink.done(vec![entry("chai")]);
        drop(sink);

        let entries = CostEmitter::new(rx).wait().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "chai");
    }

    #[test]
    fn test_wait_surfaces_error() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        sink.start(vec![]);
        sink.error(CostError::Debounced { file: "a.js".into() });
        drop(sink);

        let err = CostEmitter::new(rx).wait().unwrap_err();
        assert_eq!(err.kind(), "DebounceError");
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        drop(rx);
        // Must not panic
        sink.done(vec![]);
    }
}
