//! The [`FramePool`]: a fixed-capacity LIFO stack of UMEM frame offsets.
//!
//! Allocate pops, free pushes, both O(1). There's no ordering requirement -
//! the kernel never assumes any particular frame order - so LIFO is chosen
//! to keep the hottest frames cache-warm. The pool has a single owner (the
//! [`Engine`](crate::engine::Engine)'s polling task) and is never shared
//! across threads, so it carries no internal locking.

/// Sentinel meaning "no frame", matching the spec's `INVALID_FRAME`.
pub const INVALID_FRAME: u64 = u64::MAX;

/// A stack of free UMEM frame addresses.
#[derive(Debug, Clone)]
pub struct FramePool {
    free: Vec<u64>,
    capacity: u32,
}

/// The pool's free list already holds `capacity` entries; pushing another
/// is a bug in the caller, not a runtime condition to recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOverflow;

impl std::fmt::Display for PoolOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame pool free list already at capacity")
    }
}

impl std::error::Error for PoolOverflow {}

impl FramePool {
    /// Build a pool holding every frame address `{0, frame_size, 2 *
    /// frame_size, ..., (n_frames - 1) * frame_size}`, free_count = n_frames.
    pub fn new(n_frames: u32, frame_size: u32) -> Self {
        let addrs = (0..n_frames as u64).map(|i| i * frame_size as u64);
        Self::from_addrs(addrs)
    }

    /// Build a pool from the exact frame addresses the UMEM handed back at
    /// creation time (see [`Umem::new`](crate::umem::Umem::new)). Unlike
    /// `new`, this doesn't assume addresses are bare `frame_size` multiples
    /// - the UMEM's addresses already fold in `XDP_PACKET_HEADROOM` plus
    /// any configured extra headroom.
    pub fn from_addrs(addrs: impl ExactSizeIterator<Item = u64>) -> Self {
        let capacity = addrs.len() as u32;
        let mut free: Vec<u64> = addrs.collect();

        // Pop from the back; reverse so the lowest address is allocated
        // first (cosmetic - no correctness requirement depends on this).
        free.reverse();

        Self { free, capacity }
    }

    /// Pop the top address, or `None` if the pool is empty. O(1), never
    /// blocks.
    #[inline]
    pub fn alloc(&mut self) -> Option<u64> {
        self.free.pop()
    }

    /// Push `addr` back onto the pool.
    ///
    /// Callers must only pass an address previously obtained from the
    /// kernel (an unbounced RX descriptor, or a Completion-ring entry) -
    /// passing an address twice without an intervening `alloc` is exactly
    /// the double-free the ownership invariant forbids.
    #[inline]
    pub fn free(&mut self, addr: u64) -> Result<(), PoolOverflow> {
        if self.free.len() as u32 == self.capacity {
            return Err(PoolOverflow);
        }
        self.free.push(addr);
        Ok(())
    }

    /// Current number of free frames.
    #[inline]
    pub fn free_count(&self) -> u32 {
        self.free.len() as u32
    }

    /// Total capacity the pool was built with.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_is_full() {
        let pool = FramePool::new(8, 2048);
        assert_eq!(pool.free_count(), 8);
        assert_eq!(pool.capacity(), 8);
    }

    #[test]
    fn alloc_drains_and_free_refills() {
        let mut pool = FramePool::new(4, 2048);

        let mut addrs = Vec::new();
        while let Some(a) = pool.alloc() {
            addrs.push(a);
        }
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.free_count(), 0);

        for a in addrs.drain(..) {
            pool.free(a).unwrap();
        }
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn free_past_capacity_is_overflow() {
        let mut pool = FramePool::new(1, 2048);
        let addr = pool.alloc().unwrap();
        pool.free(addr).unwrap();
        assert_eq!(pool.free(addr), Err(PoolOverflow));
    }

    #[test]
    fn addresses_are_frame_size_multiples() {
        let pool = FramePool::new(4, 2048);
        for &addr in &pool.free {
            assert_eq!(addr % 2048, 0);
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Frame conservation: for any sequence of alloc/free calls that
        /// never frees an address the pool didn't just hand out,
        /// `free_count` always equals capacity minus whatever's currently
        /// checked out, and no address is ever handed out twice without an
        /// intervening free.
        #[test]
        fn frame_conservation(take_next in proptest::collection::vec(any::<bool>(), 0..300)) {
            const CAPACITY: u32 = 16;
            let mut pool = FramePool::new(CAPACITY, 2048);
            let mut checked_out: Vec<u64> = Vec::new();

            for take in take_next {
                if take || checked_out.is_empty() {
                    if let Some(addr) = pool.alloc() {
                        prop_assert!(
                            !checked_out.contains(&addr),
                            "address {} handed out twice without an intervening free",
                            addr
                        );
                        checked_out.push(addr);
                    }
                } else {
                    let addr = checked_out.pop().unwrap();
                    pool.free(addr).unwrap();
                }

                prop_assert_eq!(pool.free_count() + checked_out.len() as u32, CAPACITY);
            }
        }
    }
}
