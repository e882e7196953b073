//! An in-memory mock kernel: four ring stand-ins that satisfy
//! `xsk_bounce::engine::rings::{RxRing, TxRing, FillRing, CompRing}`, for
//! exercising `Engine` without a real AF_XDP socket or a veth pair.
//!
//! Simplification from the real rings: ring "capacity" here bounds a
//! single `produce` call rather than persisting across calls - the mock
//! treats every accepted frame as instantly consumed off the ring by the
//! kernel, leaving completion timing entirely up to the test (via
//! `CompRingHandle::complete`). That's enough to drive the engine's batch
//! loop through the same decision points the real rings would.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use xsk_bounce::{
    engine::rings::{CompRing, FillRing, RxRing, TxRing},
    umem::frame::FrameDesc,
};

/// Shared, `Send`-safe backing store for a mock ring.
type Shared<T> = Arc<Mutex<T>>;

#[derive(Default)]
pub struct RxState {
    pending: VecDeque<FrameDesc>,
}

pub struct MockRxRing {
    state: Shared<RxState>,
}

#[derive(Clone)]
pub struct RxHandle {
    state: Shared<RxState>,
}

impl RxHandle {
    pub fn feed(&self, descs: impl IntoIterator<Item = FrameDesc>) {
        self.state.lock().unwrap().pending.extend(descs);
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }
}

pub fn mock_rx_ring() -> (MockRxRing, RxHandle) {
    let state = Arc::new(Mutex::new(RxState::default()));
    (
        MockRxRing {
            state: state.clone(),
        },
        RxHandle { state },
    )
}

impl RxRing for MockRxRing {
    unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = descs.len().min(state.pending.len());
        for slot in descs.iter_mut().take(n) {
            *slot = state.pending.pop_front().expect("checked length above");
        }
        n
    }

    fn poll_ready(&mut self, _timeout_ms: i32) -> io::Result<bool> {
        Ok(!self.state.lock().unwrap().pending.is_empty())
    }
}

#[derive(Default)]
pub struct TxState {
    capacity: usize,
    delivered: VecDeque<FrameDesc>,
}

pub struct MockTxRing {
    state: Shared<TxState>,
}

#[derive(Clone)]
pub struct TxHandle {
    state: Shared<TxState>,
}

impl TxHandle {
    pub fn delivered(&self) -> Vec<FrameDesc> {
        self.state.lock().unwrap().delivered.iter().copied().collect()
    }

    pub fn take_delivered(&self) -> Vec<FrameDesc> {
        self.state.lock().unwrap().delivered.drain(..).collect()
    }

    /// Pops at most `n` entries off the front, simulating the driver
    /// finishing transmission of only part of what's queued.
    pub fn take_up_to(&self, n: usize) -> Vec<FrameDesc> {
        let mut state = self.state.lock().unwrap();
        let n = n.min(state.delivered.len());
        state.delivered.drain(..n).collect()
    }
}

pub fn mock_tx_ring(capacity: usize) -> (MockTxRing, TxHandle) {
    let state = Arc::new(Mutex::new(TxState {
        capacity,
        delivered: VecDeque::new(),
    }));
    (
        MockTxRing {
            state: state.clone(),
        },
        TxHandle { state },
    )
}

impl TxRing for MockTxRing {
    unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize {
        let mut state = self.state.lock().unwrap();
        if state.delivered.len() + descs.len() > state.capacity {
            return 0;
        }
        state.delivered.extend(descs.iter().copied());
        descs.len()
    }

    fn needs_wakeup(&self) -> bool {
        true
    }

    fn wakeup(&self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FillState {
    capacity: usize,
    delivered: VecDeque<FrameDesc>,
}

pub struct MockFillRing {
    state: Shared<FillState>,
}

#[derive(Clone)]
pub struct FillHandle {
    state: Shared<FillState>,
}

impl FillHandle {
    pub fn delivered_count(&self) -> usize {
        self.state.lock().unwrap().delivered.len()
    }

    pub fn drain(&self) -> Vec<FrameDesc> {
        self.state.lock().unwrap().delivered.drain(..).collect()
    }

    /// Pops at most `n` frames off the front, simulating the driver
    /// claiming only part of what's been offered for a DMA fill.
    pub fn drain_up_to(&self, n: usize) -> Vec<FrameDesc> {
        let mut state = self.state.lock().unwrap();
        let n = n.min(state.delivered.len());
        state.delivered.drain(..n).collect()
    }
}

pub fn mock_fill_ring(capacity: usize) -> (MockFillRing, FillHandle) {
    let state = Arc::new(Mutex::new(FillState {
        capacity,
        delivered: VecDeque::new(),
    }));
    (
        MockFillRing {
            state: state.clone(),
        },
        FillHandle { state },
    )
}

impl FillRing for MockFillRing {
    unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize {
        let mut state = self.state.lock().unwrap();
        if state.delivered.len() + descs.len() > state.capacity {
            return 0;
        }
        state.delivered.extend(descs.iter().copied());
        descs.len()
    }

    fn free_slots(&mut self) -> usize {
        let state = self.state.lock().unwrap();
        state.capacity - state.delivered.len()
    }
}

#[derive(Default)]
pub struct CompState {
    pending: VecDeque<FrameDesc>,
}

pub struct MockCompRing {
    state: Shared<CompState>,
}

#[derive(Clone)]
pub struct CompHandle {
    state: Shared<CompState>,
}

impl CompHandle {
    /// Simulates the NIC finishing transmission of `descs`: they become
    /// visible to the engine's next `phase_d` call.
    pub fn complete(&self, descs: impl IntoIterator<Item = FrameDesc>) {
        self.state.lock().unwrap().pending.extend(descs);
    }
}

pub fn mock_comp_ring() -> (MockCompRing, CompHandle) {
    let state = Arc::new(Mutex::new(CompState::default()));
    (
        MockCompRing {
            state: state.clone(),
        },
        CompHandle { state },
    )
}

impl CompRing for MockCompRing {
    unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = descs.len().min(state.pending.len());
        for slot in descs.iter_mut().take(n) {
            *slot = state.pending.pop_front().expect("checked length above");
        }
        n
    }
}

/// Closes the loop the four independent mock rings otherwise leave open:
/// frames the engine offers to the Fill ring become "DMA'd" into arriving
/// packets on the RX ring, and frames the engine submits to the TX ring
/// become "transmitted" into the Completion ring. Driving an `Engine`
/// purely through `KernelSim` steps (instead of `RxHandle::feed` /
/// `CompHandle::complete` directly) means every frame address flowing
/// through the system originated from the pool via the Fill ring, so the
/// ownership-disjointness property in the spec's testable-properties list
/// is actually exercised rather than assumed.
pub struct KernelSim {
    fq: FillHandle,
    rx: RxHandle,
    tx: TxHandle,
    cq: CompHandle,
    packet_len: u32,
}

impl KernelSim {
    pub fn new(fq: FillHandle, rx: RxHandle, tx: TxHandle, cq: CompHandle, packet_len: u32) -> Self {
        Self {
            fq,
            rx,
            tx,
            cq,
            packet_len,
        }
    }

    /// Moves up to `n` frames the engine most recently offered to the Fill
    /// ring onto the RX ring as received packets of `packet_len` bytes.
    pub fn deliver_rx(&self, n: usize) -> usize {
        let frames = self.fq.drain_up_to(n);
        let delivered = frames.len();
        self.rx.feed(frames.into_iter().map(|mut d| {
            d.len = self.packet_len;
            d
        }));
        delivered
    }

    /// Moves up to `n` frames the engine most recently submitted to the TX
    /// ring onto the Completion ring, as if the NIC had finished sending
    /// them.
    pub fn complete_tx(&self, n: usize) -> usize {
        let frames = self.tx.take_up_to(n);
        let completed = frames.len();
        self.cq.complete(frames);
        completed
    }
}
