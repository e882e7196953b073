use crate::ring::XskRingCons;

use super::{frame::FrameDesc, Umem};

/// Transfers ownership of [`Umem`](super::Umem) frames from kernel-space
/// back to user-space once their contents have been sent via the
/// [`TxQueue`](crate::socket::TxQueue).
///
/// See the [kernel docs](https://www.kernel.org/doc/html/latest/networking/af_xdp.html#umem-completion-ring).
#[derive(Debug)]
pub struct CompQueue {
    ring: XskRingCons,
    _umem: Umem,
}

impl CompQueue {
    pub(crate) fn new(ring: XskRingCons, umem: Umem) -> Self {
        Self { ring, _umem: umem }
    }

    /// Fill `descs` with the addresses of frames whose contents have been
    /// sent and may be reused. Returns the number of entries written,
    /// sequentially from the start of `descs`.
    ///
    /// Freed frames should be pushed back onto the
    /// [`FramePool`](crate::pool::FramePool), never directly resubmitted
    /// without going through it - that's what the ownership invariant
    /// means.
    ///
    /// # Safety
    ///
    /// The frames passed to this queue must belong to the same [`Umem`]
    /// this queue is bound to.
    #[inline]
    pub unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize {
        let nb = descs.len() as u32;

        if nb == 0 {
            return 0;
        }

        let mut idx = 0;

        let cnt = unsafe { libbpf_sys::_xsk_ring_cons__peek(self.ring.as_mut(), nb, &mut idx) };

        if cnt > 0 {
            for desc in descs.iter_mut().take(cnt as usize) {
                let addr =
                    unsafe { *libbpf_sys::_xsk_ring_cons__comp_addr(self.ring.as_ref(), idx) };

                desc.addr = addr as usize;
                desc.len = 0;
                desc.options = 0;

                idx += 1;
            }

            unsafe { libbpf_sys::_xsk_ring_cons__release(self.ring.as_mut(), cnt) };
        }

        cnt as usize
    }
}
