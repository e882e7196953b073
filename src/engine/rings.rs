//! Trait seams between the [`Engine`](super::Engine) and the four kernel
//! rings, so the batch loop in `engine/mod.rs` can run against either the
//! real AF_XDP queues or an in-memory mock kernel in `tests/`.
//!
//! Each method mirrors the batch-oriented API the `socket`/`umem` queue
//! wrappers already expose (`produce`/`consume`), not the raw
//! reserve/peek/submit/release primitives from the spec's operation list -
//! those are collapsed inside each wrapper's existing implementation.

use std::io;

use crate::{
    socket::{RxQueue, TxQueue},
    umem::{frame::FrameDesc, CompQueue, FillQueue},
};

/// The kernel-facing RX ring: frames the driver has filled.
pub trait RxRing: Send {
    /// # Safety
    /// See [`RxQueue::consume`].
    unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize;

    fn poll_ready(&mut self, timeout_ms: i32) -> io::Result<bool>;
}

/// The kernel-facing TX ring: frames queued for transmission.
pub trait TxRing: Send {
    /// # Safety
    /// See [`TxQueue::produce`].
    unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize;

    fn needs_wakeup(&self) -> bool;
    fn wakeup(&self) -> io::Result<()>;
}

/// The kernel-facing Fill ring: empty frames handed to the driver for RX.
pub trait FillRing: Send {
    /// # Safety
    /// See [`FillQueue::produce`].
    unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize;

    /// Slots currently free on the ring - callers must clamp a batch to
    /// this before calling `produce`, since a batch larger than the ring's
    /// free space is refused in full rather than partially accepted.
    fn free_slots(&mut self) -> usize;
}

/// The kernel-facing Completion ring: frames whose TX has finished.
pub trait CompRing: Send {
    /// # Safety
    /// See [`CompQueue::consume`].
    unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize;
}

impl RxRing for RxQueue {
    unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize {
        unsafe { RxQueue::consume(self, descs) }
    }

    fn poll_ready(&mut self, timeout_ms: i32) -> io::Result<bool> {
        self.fd_mut().poll_read(timeout_ms)
    }
}

impl TxRing for TxQueue {
    unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize {
        unsafe { TxQueue::produce(self, descs) }
    }

    fn needs_wakeup(&self) -> bool {
        TxQueue::needs_wakeup(self)
    }

    fn wakeup(&self) -> io::Result<()> {
        TxQueue::wakeup(self)
    }
}

impl FillRing for FillQueue {
    unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize {
        unsafe { FillQueue::produce(self, descs) }
    }

    fn free_slots(&mut self) -> usize {
        FillQueue::free_slots(self)
    }
}

impl CompRing for CompQueue {
    unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize {
        unsafe { CompQueue::consume(self, descs) }
    }
}

/// Extension used only by `Fd` so `poll_read` is reachable through the
/// trait without exposing the whole `RxQueue` surface.
trait FdPollRead {
    fn poll_read(&mut self, timeout_ms: i32) -> io::Result<bool>;
}
