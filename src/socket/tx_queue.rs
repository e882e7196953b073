use libc::{EAGAIN, EBUSY, ENETDOWN, ENOBUFS, MSG_DONTWAIT};
use std::{io, os::unix::prelude::AsRawFd, ptr};

use crate::{ring::XskRingProd, umem::frame::FrameDesc, util};

use super::{fd::Fd, Socket};

/// The transmitting side of an AF_XDP [`Socket`](crate::socket::Socket).
///
/// See the [kernel docs](https://www.kernel.org/doc/html/latest/networking/af_xdp.html#tx-ring).
pub struct TxQueue {
    ring: XskRingProd,
    fd: Fd,
    _socket: Socket,
}

unsafe impl Send for TxQueue {}

impl TxQueue {
    pub(super) fn new(ring: XskRingProd, socket: Socket) -> Self {
        Self {
            ring,
            fd: socket.fd.clone(),
            _socket: socket,
        }
    }

    /// Let the kernel know that the frames described by `descs` are ready
    /// to be transmitted. Returns the number submitted - either
    /// `descs.len()` or `0`, since a partial reservation is refused
    /// entirely rather than split.
    ///
    /// # Safety
    ///
    /// Submitting the same frame to this ring and the
    /// [`FillQueue`](crate::umem::FillQueue) at the same time is a data
    /// race. Once submitted, a frame must not be reused until it reappears
    /// via the [`CompQueue`](crate::umem::CompQueue).
    #[inline]
    pub unsafe fn produce(&mut self, descs: &[FrameDesc]) -> usize {
        let nb = descs.len() as u32;

        if nb == 0 {
            return 0;
        }

        let mut idx: u32 = 0;

        let cnt = unsafe { libbpf_sys::_xsk_ring_prod__reserve(self.ring.as_mut(), nb, &mut idx) };

        if cnt > 0 {
            for desc in descs.iter().take(cnt as usize) {
                let send_pkt_desc =
                    unsafe { libbpf_sys::_xsk_ring_prod__tx_desc(self.ring.as_mut(), idx) };

                unsafe {
                    (*send_pkt_desc).addr = desc.addr as u64;
                    (*send_pkt_desc).len = desc.len;
                    (*send_pkt_desc).options = desc.options;
                }

                idx += 1;
            }

            unsafe { libbpf_sys::_xsk_ring_prod__submit(self.ring.as_mut(), cnt) };
        }

        cnt as usize
    }

    /// Same as [`produce`](Self::produce), but wakes the kernel
    /// afterwards if the ring's `NEED_WAKEUP` flag is set.
    ///
    /// # Safety
    ///
    /// See [`produce`](Self::produce).
    #[inline]
    pub unsafe fn produce_and_wakeup(&mut self, descs: &[FrameDesc]) -> io::Result<usize> {
        let cnt = unsafe { self.produce(descs) };

        if self.needs_wakeup() {
            self.wakeup()?;
        }

        Ok(cnt)
    }

    /// Wake up the kernel to continue processing submitted frames.
    #[inline]
    pub fn wakeup(&self) -> io::Result<()> {
        let ret = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                ptr::null(),
                0,
                MSG_DONTWAIT,
                ptr::null(),
                0,
            )
        };

        if ret < 0 {
            match util::get_errno() {
                ENOBUFS | EAGAIN | EBUSY | ENETDOWN => (),
                _ => return Err(io::Error::last_os_error()),
            }
        }

        Ok(())
    }

    /// Whether `NEED_WAKEUP` is set on the TX ring, meaning
    /// [`wakeup`](Self::wakeup) is required before the kernel resumes
    /// sending.
    #[inline]
    pub fn needs_wakeup(&self) -> bool {
        unsafe { libbpf_sys::_xsk_ring_prod__needs_wakeup(self.ring.as_ref()) != 0 }
    }

    /// Polls the socket, returning `true` if it's ready to write.
    #[inline]
    pub fn poll(&mut self, poll_timeout: i32) -> io::Result<bool> {
        self.fd.poll_write(poll_timeout)
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
