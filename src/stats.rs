//! Periodic console stats reporting.
//!
//! Runs on its own thread, reading the [`Engine`](crate::engine::Engine)'s
//! [`Counters`](crate::engine::counters::Counters) block without ever
//! touching the engine itself - the counters are the only shared state.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{engine::counters::Counters, signal::StopFlag};

/// Drives a fixed-interval loop that prints rx/tx rates to the log until
/// `stop` is set, then exits.
pub struct StatsReporter {
    counters: Arc<Counters>,
    stop: StopFlag,
    interval: Duration,
}

impl StatsReporter {
    pub fn new(counters: Arc<Counters>, stop: StopFlag, interval: Duration) -> Self {
        Self {
            counters,
            stop,
            interval,
        }
    }

    /// Spawns the reporting thread, returning a handle the caller can join
    /// after the engine's `run()` returns.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self) {
        let mut last = self.counters.snapshot();
        let mut last_at = Instant::now();

        while !self.stop.is_set() {
            thread::sleep(self.interval);

            let now = Instant::now();
            let snapshot = self.counters.snapshot();
            let elapsed = now.duration_since(last_at).as_secs_f64();

            if elapsed > 0.0 {
                let rx_pps = (snapshot.rx_packets.saturating_sub(last.rx_packets)) as f64 / elapsed;
                let tx_pps = (snapshot.tx_packets.saturating_sub(last.tx_packets)) as f64 / elapsed;
                let rx_mbps = (snapshot.rx_bytes.saturating_sub(last.rx_bytes)) as f64 * 8.0
                    / elapsed
                    / 1_000_000.0;
                let tx_mbps = (snapshot.tx_bytes.saturating_sub(last.tx_bytes)) as f64 * 8.0
                    / elapsed
                    / 1_000_000.0;

                log::info!(
                    "rx: {:.0} pps ({:.2} Mbps) tx: {:.0} pps ({:.2} Mbps) total rx={} tx={}",
                    rx_pps,
                    rx_mbps,
                    tx_pps,
                    tx_mbps,
                    snapshot.rx_packets,
                    snapshot.tx_packets,
                );
            }

            last = snapshot;
            last_at = now;
        }
    }
}
