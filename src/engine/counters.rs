//! The engine's lock-free counter block: written only by the polling task,
//! read concurrently (never written) by the [`StatsReporter`](crate::stats::StatsReporter).

use std::sync::atomic::{AtomicU64, Ordering};

/// Packet/byte/drop counters updated once per batch iteration.
///
/// All fields use `Relaxed` ordering: on every platform this binary
/// targets, a `u64` load is already atomic at that width, so a single
/// relaxed load per counter is enough to avoid a torn read - no
/// snapshot-twice-and-retry dance is needed (see
/// [`StatsReporter`](crate::stats::StatsReporter), which reads each
/// snapshot once per interval).
#[derive(Debug, Default)]
pub struct Counters {
    pub rx_packets: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub tx_packets: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub tx_drop: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_rx(&self, packets: u64, bytes: u64) {
        self.rx_packets.fetch_add(packets, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tx(&self, packets: u64, bytes: u64) {
        self.tx_packets.fetch_add(packets, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tx_drop(&self, n: u64) {
        self.tx_drop.fetch_add(n, Ordering::Relaxed);
    }

    /// A torn-read-tolerant snapshot: the four counters that matter for
    /// rate computation, read with `Relaxed` loads.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of the counters that matter for rate computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
}
