use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the reactor thread and readable from any thread.
#[derive(Debug, Default)]
pub struct ProxyStatistics {
    received: AtomicU64,
    forwarded: AtomicU64,
    mutated: AtomicU64,
    send_failures: AtomicU64,
    bytes_received: AtomicU64,
    bytes_forwarded: AtomicU64,
}

/// Point-in-time copy of [`ProxyStatistics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Datagrams received on the listen endpoint.
    pub received: u64,
    /// Datagrams successfully forwarded.
    pub forwarded: u64,
    /// Datagrams the mutator rewrote.
    pub mutated: u64,
    /// Forward attempts the OS rejected.
    pub send_failures: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
    /// Payload bytes forwarded.
    pub bytes_forwarded: u64,
}

impl ProxyStatistics {
    pub(crate) fn record_received(&self, bytes: usize) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self, bytes: usize) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_mutated(&self) {
        self.mutated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            mutated: self.mutated.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
        }
    }
}
