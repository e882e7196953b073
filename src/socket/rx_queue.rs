use std::io;

use crate::{ring::XskRingCons, umem::frame::FrameDesc};

use super::{fd::Fd, Socket};

/// The receiving side of an AF_XDP [`Socket`](crate::socket::Socket).
///
/// See the [kernel docs](https://www.kernel.org/doc/html/latest/networking/af_xdp.html#rx-ring).
pub struct RxQueue {
    ring: XskRingCons,
    fd: Fd,
    _socket: Socket,
}

unsafe impl Send for RxQueue {}

impl RxQueue {
    pub(super) fn new(ring: XskRingCons, socket: Socket) -> Self {
        Self {
            ring,
            fd: socket.fd.clone(),
            _socket: socket,
        }
    }

    /// Populate `descs` with information on packets received on the RX
    /// ring. Returns the number of entries written, sequentially from the
    /// start of `descs`.
    ///
    /// Once handled, consumed frames should be returned to the
    /// [`FramePool`](crate::pool::FramePool) and re-submitted via either
    /// the [`FillQueue`](crate::umem::FillQueue) or
    /// [`TxQueue`](crate::socket::TxQueue) - never left unaccounted for.
    ///
    /// # Safety
    ///
    /// `descs` must describe frames belonging to the same
    /// [`Umem`](crate::umem::Umem) this queue was created against.
    #[inline]
    pub unsafe fn consume(&mut self, descs: &mut [FrameDesc]) -> usize {
        let nb = descs.len() as u32;

        if nb == 0 {
            return 0;
        }

        let mut idx: u32 = 0;

        let cnt = unsafe { libbpf_sys::_xsk_ring_cons__peek(self.ring.as_mut(), nb, &mut idx) };

        if cnt > 0 {
            for desc in descs.iter_mut().take(cnt as usize) {
                let recv_pkt_desc =
                    unsafe { libbpf_sys::_xsk_ring_cons__rx_desc(self.ring.as_ref(), idx) };

                unsafe {
                    desc.addr = (*recv_pkt_desc).addr as usize;
                    desc.len = (*recv_pkt_desc).len;
                    desc.options = (*recv_pkt_desc).options;
                }

                idx += 1;
            }

            unsafe { libbpf_sys::_xsk_ring_cons__release(self.ring.as_mut(), cnt) };
        }

        cnt as usize
    }

    /// Same as [`consume`](Self::consume), but polls the socket for
    /// readability first.
    ///
    /// # Safety
    ///
    /// See [`consume`](Self::consume).
    #[inline]
    pub unsafe fn poll_and_consume(
        &mut self,
        descs: &mut [FrameDesc],
        poll_timeout: i32,
    ) -> io::Result<usize> {
        if self.fd.poll_read(poll_timeout)? {
            Ok(unsafe { self.consume(descs) })
        } else {
            Ok(0)
        }
    }

    /// The [`Socket`](crate::socket::Socket)'s file descriptor.
    #[inline]
    pub fn fd(&self) -> &Fd {
        &self.fd
    }

    #[inline]
    pub fn fd_mut(&mut self) -> &mut Fd {
        &mut self.fd
    }
}
