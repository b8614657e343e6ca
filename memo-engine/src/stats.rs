//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of engine activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Requests answered from the store.
    pub hits: u64,
    /// Store probes that found nothing usable.
    pub misses: u64,
    /// Times an operation was invoked.
    pub invocations: u64,
    /// Successful store writes.
    pub writes: u64,
    /// Store reads that failed and were treated as misses.
    pub read_failures: u64,
    /// Store writes that failed and were ignored.
    pub write_failures: u64,
    /// Stored or shared values that could not be decoded.
    pub decode_failures: u64,
    /// Results that could not be encoded for storage.
    pub encode_failures: u64,
    /// Requests answered by a concurrent identical request.
    pub coalesced: u64,
}

impl EngineStats {
    /// Calculate the hit rate (0.0 to 1.0) over store probes.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    invocations: AtomicU64,
    writes: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
    decode_failures: AtomicU64,
    encode_failures: AtomicU64,
    coalesced: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl StatsCounters {
    pub(crate) fn hit(&self) {
        bump(&self.hits)
    }

    pub(crate) fn miss(&self) {
        bump(&self.misses)
    }

    pub(crate) fn invocation(&self) {
        bump(&self.invocations)
    }

    pub(crate) fn write(&self) {
        bump(&self.writes)
    }

    pub(crate) fn read_failure(&self) {
        bump(&self.read_failures)
    }

    pub(crate) fn write_failure(&self) {
        bump(&self.write_failures)
    }

    pub(crate) fn decode_failure(&self) {
        bump(&self.decode_failures)
    }

    pub(crate) fn encode_failure(&self) {
        bump(&self.encode_failures)
    }

    pub(crate) fn coalesced(&self) {
        bump(&self.coalesced)
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        EngineStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}
