//! `xsk-bounce`: a userspace packet-I/O bounce engine on AF_XDP.
//!
//! A small in-kernel eBPF program ([`xdp`]) redirects selected ingress
//! packets into a shared memory region (the UMEM) mapped into this
//! process; packet descriptors are then consumed from a receive ring and
//! immediately queued for retransmission out the same interface, recycling
//! the same UMEM buffers for both directions. See [`engine::Engine`] for
//! the batch loop that drives this.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod prelude;
mod ring;
pub mod signal;
pub mod socket;
pub mod stats;
pub mod umem;
mod util;
pub mod xdp;
