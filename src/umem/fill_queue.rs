use std::io;

use crate::{ring::XskRingProd, socket::Fd};

use super::{frame::FrameDesc, Umem};

/// Transfers ownership of [`Umem`](super::Umem) frames from user-space to
/// kernel-space so they may be used to receive packets.
///
/// Frames submitted here arrive, once filled, via the
/// [`RxQueue`](crate::socket::RxQueue).
///
/// See the [kernel docs](https://www.kernel.org/doc/html/latest/networking/af_xdp.html#umem-fill-ring).
#[derive(Debug)]
pub struct FillQueue {
    ring: XskRingProd,
    _umem: Umem,
}

impl FillQueue {
    pub(crate) fn new(ring: XskRingProd, umem: Umem) -> Self {
        Self { ring, _umem: umem }
    }

    /// Let the kernel know that the frames described by `descs` may be
    /// used to receive data. Returns the number of frames submitted.
    ///
    /// If `descs` is longer than the space available on the ring, no
    /// frames at all are handed over - callers should retry with the
    /// remainder rather than assume partial progress.
    ///
    /// # Safety
    ///
    /// Submitting the same frame address to this queue and the
    /// [`TxQueue`](crate::socket::TxQueue) at the same time is a data race;
    /// the frames passed here must belong to the same [`Umem`] this queue
    /// is bound to.
    #[inline]
    pub unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize {
        let nb = descs.len() as u32;

        if nb == 0 {
            return 0;
        }

        let mut idx = 0;

        let cnt = unsafe { libbpf_sys::_xsk_ring_prod__reserve(self.ring.as_mut(), nb, &mut idx) };

        if cnt > 0 {
            for desc in descs.iter().take(cnt as usize) {
                unsafe {
                    *libbpf_sys::_xsk_ring_prod__fill_addr(self.ring.as_mut(), idx) =
                        desc.addr as u64
                };

                idx += 1;
            }

            unsafe { libbpf_sys::_xsk_ring_prod__submit(self.ring.as_mut(), cnt) };
        }

        cnt as usize
    }

    /// Same as [`produce`](Self::produce) but for a single frame.
    ///
    /// # Safety
    ///
    /// See [`produce`](Self::produce).
    #[inline]
    pub unsafe fn produce_one(&mut self, desc: &FrameDesc) -> usize {
        let mut idx = 0;

        let cnt = unsafe { libbpf_sys::_xsk_ring_prod__reserve(self.ring.as_mut(), 1, &mut idx) };

        if cnt > 0 {
            unsafe {
                *libbpf_sys::_xsk_ring_prod__fill_addr(self.ring.as_mut(), idx) = desc.addr as u64
            };

            unsafe { libbpf_sys::_xsk_ring_prod__submit(self.ring.as_mut(), cnt) };
        }

        cnt as usize
    }

    /// Same as [`produce`](Self::produce), but wakes the kernel afterwards
    /// if the ring's `NEED_WAKEUP` flag is set.
    ///
    /// See the [kernel docs](https://www.kernel.org/doc/html/latest/networking/af_xdp.html#xdp-use-need-wakeup-bind-flag).
    ///
    /// # Safety
    ///
    /// See [`produce`](Self::produce).
    #[inline]
    pub unsafe fn produce_and_wakeup(
        &mut self,
        descs: &[FrameDesc],
        socket_fd: &mut Fd,
        poll_timeout: i32,
    ) -> io::Result<usize> {
        let cnt = unsafe { self.produce(descs) };

        if cnt > 0 && self.needs_wakeup() {
            self.wakeup(socket_fd, poll_timeout)?;
        }

        Ok(cnt)
    }

    /// Wake up the kernel so it continues filling receive descriptors.
    #[inline]
    pub fn wakeup(&self, fd: &mut Fd, poll_timeout: i32) -> io::Result<()> {
        fd.poll_read(poll_timeout)?;
        Ok(())
    }

    /// Whether `NEED_WAKEUP` is set on the fill ring, meaning
    /// [`wakeup`](Self::wakeup) is required before the kernel resumes
    /// filling receive descriptors.
    #[inline]
    pub fn needs_wakeup(&self) -> bool {
        unsafe { libbpf_sys::_xsk_ring_prod__needs_wakeup(self.ring.as_ref()) != 0 }
    }

    /// Number of slots currently free on the ring. Callers offering more
    /// than this to [`produce`](Self::produce) get 0 back rather than a
    /// partial submission - check here first rather than assume.
    #[inline]
    pub fn free_slots(&mut self) -> usize {
        unsafe { libbpf_sys::_xsk_prod_nb_free(self.ring.as_mut(), 0) as usize }
    }
}
