use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, trace};

/// Cooperative cancellation flag shared between a request and its sizers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct InFlight {
    fingerprint: String,
    token: CancellationToken,
    generation: u64,
}

/// Process-wide map from source file to its in-flight request.
///
/// A new request for a file whose fingerprint differs supersedes the old
/// one: the old token is cancelled and that request must terminate with a
/// debounce error. A matching fingerprint leaves the prior request running
/// alongside the new one. Teardown is generation-guarded so an old request
/// finishing late never evicts a newer registration.
#[derive(Default)]
pub(crate) struct DebounceRegistry {
    inner: DashMap<String, InFlight>,
    generations: AtomicU64,
}

impl DebounceRegistry {
    pub fn begin(&self, file: &str, fingerprint: &str) -> (CancellationToken, u64) {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::default();
        let flight = InFlight {
            fingerprint: fingerprint.to_string(),
            token: token.clone(),
            generation,
        };

        // The entry holds its shard lock, so supersede-and-replace is atomic
        match self.inner.entry(file.to_string()) {
            Entry::Occupied(mut occupied) => {
                let prior = occupied.get();
                if prior.fingerprint == fingerprint {
                    trace!("Request for {} re-entered with the same fingerprint", file);
                } else {
                    debug!("Superseding in-flight request for {}", file);
                    prior.token.cancel();
                }
                occupied.insert(flight);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(flight);
            }
        }
        (token, generation)
    }

    pub fn finish(&self, file: &str, generation: u64) {
        if self.inner.remove_if(file, |_, f| f.generation == generation).is_some() {
            trace!("Removed {} from debounce registry", file);
        }
    }

    pub fn cancel_all(&self) {
        debug!("Cancelling {} in-flight requests", self.inner.len());
        for flight in self.inner.iter() {
            flight.token.cancel();
        }
        self.inner.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
