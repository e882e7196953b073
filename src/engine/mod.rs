//! The polling core: composes a UMEM frame pool and the four kernel rings
//! into the RX -> bounce -> TX -> complete batch loop.
//!
//! Generic over the four ring traits in [`rings`] so the same loop runs
//! against either the real AF_XDP queues (`socket::{RxQueue, TxQueue}`,
//! `umem::{FillQueue, CompQueue}`) or the in-memory mock kernel used in
//! `tests/`.

pub mod counters;
pub mod rings;

use std::{
    io,
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use counters::Counters;
use rings::{CompRing, FillRing, RxRing, TxRing};

use crate::{pool::FramePool, signal::StopFlag, umem::frame::FrameDesc};

/// Packets handled per RX peek, matching the spec's "batch iteration" unit.
pub const RX_BATCH_SIZE: usize = 64;

/// Frames drained from the Completion ring per inner phase-D chunk. The
/// phase loops chunk-at-a-time until a chunk comes back short, so this is
/// a throughput knob, not a correctness bound - unlike `RX_BATCH_SIZE`
/// this size imposes no upper bound on how many completions one call to
/// [`Engine::phase_d`] can drain.
const COMP_DRAIN_CHUNK: usize = 64;

/// Bounded retry ceiling for fill-ring backpressure.
pub const MAX_FQ_RETRIES: u32 = 1024;

/// How long the shutdown drain waits for outstanding TX to complete before
/// giving up and leaking the remainder into the UMEM region.
pub const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_millis(100);

/// Readability-wait timeout for cooperative-wait mode.
pub const COOPERATIVE_POLL_TIMEOUT_MS: i32 = 1000;

/// Busy-wait spins phases A-D with no sleep; cooperative wait blocks on
/// socket readability between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Busy,
    Cooperative,
}

/// `Uninitialized` is implicit (the Rust type doesn't exist yet); states
/// visible at runtime start at `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initialized,
    Running,
    Stopping,
    Terminated,
}

/// TTL / packet-count auto-shutdown gates (`-t`/`-l`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineLimits {
    pub ttl: Option<Duration>,
    pub packet_limit: Option<u64>,
}

/// The RX -> bounce -> TX -> complete batch loop.
///
/// Owns its [`FramePool`] and the four rings exclusively - there is no
/// internal locking because nothing else ever touches these fields.
pub struct Engine<Rx, Tx, Fq, Cq> {
    rx: Rx,
    tx: Tx,
    fq: Fq,
    cq: Cq,
    pool: FramePool,
    outstanding_tx: u32,
    counters: Arc<Counters>,
    stop: StopFlag,
    poll_mode: PollMode,
    limits: EngineLimits,
    state: Lifecycle,
    started_at: Option<Instant>,
    rx_scratch: [FrameDesc; RX_BATCH_SIZE],
}

impl<Rx, Tx, Fq, Cq> Engine<Rx, Tx, Fq, Cq>
where
    Rx: RxRing,
    Tx: TxRing,
    Fq: FillRing,
    Cq: CompRing,
{
    pub fn new(
        rx: Rx,
        tx: Tx,
        fq: Fq,
        cq: Cq,
        pool: FramePool,
        poll_mode: PollMode,
        limits: EngineLimits,
        stop: StopFlag,
    ) -> Self {
        Self {
            rx,
            tx,
            fq,
            cq,
            pool,
            outstanding_tx: 0,
            counters: Arc::new(Counters::new()),
            stop,
            poll_mode,
            limits,
            state: Lifecycle::Initialized,
            started_at: None,
            rx_scratch: [FrameDesc::new(0); RX_BATCH_SIZE],
        }
    }

    /// Shared handle to the counter block, for the [`StatsReporter`](crate::stats::StatsReporter).
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn outstanding_tx(&self) -> u32 {
        self.outstanding_tx
    }

    pub fn free_frames(&self) -> u32 {
        self.pool.free_count()
    }

    /// Runs batch iterations until `stop` is observed, the packet limit is
    /// reached, or the TTL elapses, then performs the shutdown drain.
    pub fn run(&mut self) -> io::Result<()> {
        self.state = Lifecycle::Running;
        self.started_at.get_or_insert_with(Instant::now);

        loop {
            if !self.step()? {
                break;
            }

            if self.shutdown_check() {
                break;
            }
        }

        self.state = Lifecycle::Stopping;
        self.drain_on_shutdown()?;
        self.state = Lifecycle::Terminated;

        Ok(())
    }

    /// Runs a single batch iteration: in cooperative mode, waits for RX
    /// readiness first (draining completions and returning `Ok(false)`
    /// instead of phases A-C if nothing is ready within the timeout); in
    /// busy mode, always runs phases A through D. Returns `Ok(true)` if
    /// phases A-C ran, `Ok(false)` if only phase D ran (cooperative,
    /// nothing ready).
    ///
    /// Exposed so tests can drive the engine one iteration at a time
    /// against a mock kernel instead of only through [`run`](Self::run)'s
    /// unbounded loop.
    pub fn step(&mut self) -> io::Result<bool> {
        if self.poll_mode == PollMode::Cooperative {
            let ready = self.rx.poll_ready(COOPERATIVE_POLL_TIMEOUT_MS)?;
            if !ready {
                // Completions may accumulate independently of RX activity.
                self.phase_d()?;
                return Ok(false);
            }
        }

        let rcvd = self.phase_a();
        self.phase_b();
        self.phase_c(rcvd);
        self.phase_d()?;

        Ok(true)
    }

    /// Phase A - receive peek. Returns the number of descriptors read into
    /// `rx_scratch`; zero is not treated specially, the loop always
    /// proceeds through phase D.
    fn phase_a(&mut self) -> usize {
        unsafe { self.rx.consume(&mut self.rx_scratch) }
    }

    /// Phase B - fill-ring replenishment. `need = min(free_count,
    /// fq_free_slots)` per the spec - the Fill ring's `produce` is
    /// all-or-nothing, so offering more than its free space guarantees a
    /// rejected batch every time. Allocates up to `need` frames and offers
    /// them; any that the ring refuses go back to the pool, in reverse
    /// allocation order. Bounded by [`MAX_FQ_RETRIES`] - on exhaustion this
    /// logs and proceeds with whatever partial refill succeeded, never
    /// hangs.
    fn phase_b(&mut self) {
        let mut need = self.pool.free_count().min(self.fq.free_slots() as u32);
        if need == 0 {
            return;
        }

        let mut retries: u32 = 0;

        loop {
            let mut batch = Vec::with_capacity(need as usize);
            for _ in 0..need {
                match self.pool.alloc() {
                    Some(addr) => batch.push(FrameDesc::new(addr as usize)),
                    None => break,
                }
            }

            if batch.is_empty() {
                break;
            }

            let submitted = unsafe { self.fq.produce(&batch) };

            if submitted < batch.len() {
                // Return the frames the ring refused, in reverse order.
                for desc in batch[submitted..].iter().rev() {
                    self.pool
                        .free(desc.addr as u64)
                        .expect("frame pool overflow: invariant violation");
                }
            }

            if submitted > 0 {
                break;
            }

            retries += 1;
            if retries >= MAX_FQ_RETRIES {
                log::warn!(
                    "fill ring refill made no progress after {} retries; proceeding with partial refill",
                    MAX_FQ_RETRIES
                );
                break;
            }

            std::hint::spin_loop();
            need = self.pool.free_count().min(self.fq.free_slots() as u32);
            if need == 0 {
                break;
            }
        }
    }

    /// Phase C - bounce each received packet onto the TX ring, or drop it
    /// back into the pool if the TX ring has no room.
    fn phase_c(&mut self, rcvd: usize) {
        let mut rx_bytes = 0u64;

        for desc in &self.rx_scratch[..rcvd] {
            rx_bytes += desc.len as u64;

            let one = [*desc];
            let submitted = unsafe { self.tx.produce(&one) };

            if submitted == 1 {
                self.outstanding_tx += 1;
                self.counters.record_tx(1, desc.len as u64);
            } else {
                self.pool
                    .free(desc.addr as u64)
                    .expect("frame pool overflow: invariant violation");
                self.counters.record_tx_drop(1);
            }
        }

        if rcvd > 0 {
            self.counters.record_rx(rcvd as u64, rx_bytes);
        }
    }

    /// Phase D - kick the kernel to process outstanding TX, then drain the
    /// Completion ring back into the pool.
    fn phase_d(&mut self) -> io::Result<()> {
        if self.outstanding_tx > 0 && self.tx.needs_wakeup() {
            self.tx.wakeup()?;
        }

        let mut completed: u32 = 0;
        loop {
            let mut buf = [FrameDesc::new(0); COMP_DRAIN_CHUNK];
            let n = unsafe { self.cq.consume(&mut buf) };
            if n == 0 {
                break;
            }

            for desc in &buf[..n] {
                self.pool
                    .free(desc.addr as u64)
                    .expect("frame pool overflow: invariant violation");
            }

            completed += n as u32;
            if n < COMP_DRAIN_CHUNK {
                break;
            }
        }

        self.outstanding_tx = self
            .outstanding_tx
            .checked_sub(completed)
            .expect("outstanding_tx underflow: invariant violation");

        Ok(())
    }

    /// Checks stop conditions. Setting the flag here doesn't break the
    /// current iteration - the next iteration's check is what actually
    /// exits the loop, bounding overrun by at most one batch.
    fn shutdown_check(&mut self) -> bool {
        if self.stop.is_set() {
            return true;
        }

        if let Some(limit) = self.limits.packet_limit {
            if self.counters.rx_packets.load(Ordering::Relaxed) >= limit {
                self.stop.set();
            }
        }

        if let Some(ttl) = self.limits.ttl {
            if let Some(started) = self.started_at {
                if started.elapsed() >= ttl {
                    self.stop.set();
                }
            }
        }

        false
    }

    /// Runs phase D repeatedly until `outstanding_tx` reaches zero or the
    /// drain deadline passes. Anything still in flight at the deadline is
    /// leaked into the UMEM region and reclaimed when it's unmapped.
    fn drain_on_shutdown(&mut self) -> io::Result<()> {
        let deadline = Instant::now() + SHUTDOWN_DRAIN_DEADLINE;

        while self.outstanding_tx > 0 && Instant::now() < deadline {
            self.phase_d()?;
        }

        if self.outstanding_tx > 0 {
            log::warn!(
                "shutdown drain deadline reached with {} frame(s) still in flight; \
                 leaked into the UMEM region until teardown",
                self.outstanding_tx
            );
        }

        Ok(())
    }
}
