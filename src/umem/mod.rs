//! Types for creating and sharing a [`Umem`]: the mmap'd region registered
//! with the kernel, and the Fill/Completion rings that move frame
//! ownership across the user/kernel boundary.

mod mem;
use mem::UmemRegion;

pub mod frame;
use frame::FrameDesc;

mod fill_queue;
pub use fill_queue::FillQueue;

mod comp_queue;
pub use comp_queue::CompQueue;

use libbpf_sys::xsk_umem;
use std::{
    borrow::Borrow,
    error::Error,
    fmt, io,
    num::NonZeroU32,
    ptr::{self, NonNull},
    sync::{Arc, Mutex},
};

use crate::{
    config::UmemConfig,
    ring::{XskRingCons, XskRingProd},
};

/// Wrapper around a pointer to a [`xsk_umem`]. Guarantees that the pointer
/// is both non-null and unique.
#[derive(Debug)]
struct XskUmem(NonNull<xsk_umem>);

impl XskUmem {
    /// # Safety
    ///
    /// Only one instance of this struct may exist since it deletes the
    /// UMEM as part of its [`Drop`] impl. If there are copies or clones of
    /// `ptr` then care must be taken to ensure they aren't used once this
    /// struct goes out of scope, and that they don't delete the UMEM
    /// themselves.
    unsafe fn new(ptr: NonNull<xsk_umem>) -> Self {
        Self(ptr)
    }

    fn as_mut_ptr(&self) -> *mut xsk_umem {
        self.0.as_ptr()
    }
}

impl Drop for XskUmem {
    fn drop(&mut self) {
        // SAFETY: unsafe constructor contract guarantees the UMEM has not
        // been deleted already.
        let err = unsafe { libbpf_sys::xsk_umem__delete(self.0.as_ptr()) };

        if err != 0 {
            log::error!("failed to delete umem with error code {}", err);
        }
    }
}

unsafe impl Send for XskUmem {}

/// Wraps the [`xsk_umem`] pointer together with whatever fill/completion
/// rings the kernel handed back at creation time but that haven't yet been
/// claimed by a socket.
///
/// `umem_ptr` must appear before anything else that might reference the
/// mapped memory, so it is dropped first.
#[derive(Debug)]
struct UmemInner {
    umem_ptr: XskUmem,
    saved_fq_and_cq: Option<(XskRingProd, XskRingCons)>,
}

impl UmemInner {
    fn new(umem_ptr: XskUmem, saved_fq_and_cq: Option<(XskRingProd, XskRingCons)>) -> Self {
        Self {
            umem_ptr,
            saved_fq_and_cq,
        }
    }
}

/// A region of contiguous virtual memory divided into equal-sized frames.
/// Provides the working memory for the AF_XDP [`Socket`](crate::socket::Socket)
/// this process binds.
#[derive(Debug, Clone)]
pub struct Umem {
    inner: Arc<Mutex<UmemInner>>,
    #[allow(dead_code)]
    mem: UmemRegion,
}

impl Umem {
    /// Create a UMEM backed by an anonymous memory mapped region holding
    /// `frame_count` frames, and the flat list of frame descriptors that
    /// describes it.
    ///
    /// `use_huge_pages` instructs `mmap()` to back the region with huge
    /// pages; if that fails check `HugePages_Total` in `/proc/meminfo`.
    pub fn new(
        config: UmemConfig,
        frame_count: NonZeroU32,
        use_huge_pages: bool,
    ) -> Result<(Self, Vec<FrameDesc>), UmemCreateError> {
        let frame_layout: FrameLayout = config.into();

        let mem = UmemRegion::new(frame_count, frame_layout, use_huge_pages).map_err(|e| {
            UmemCreateError {
                kind: UmemCreateErrorKind::AllocFailed,
                reason: "failed to create mmap'd UMEM region",
                err: e,
            }
        })?;

        let mut umem_ptr = ptr::null_mut();
        let mut fq = XskRingProd::default();
        let mut cq = XskRingCons::default();

        let err = unsafe {
            libbpf_sys::xsk_umem__create(
                &mut umem_ptr,
                mem.as_ptr(),
                mem.len() as u64,
                fq.as_mut(),
                cq.as_mut(),
                &config.into(),
            )
        };

        let umem_ptr = match NonNull::new(umem_ptr) {
            Some(umem_ptr) => {
                // SAFETY: this is the only `XskUmem` instance for this
                // pointer, and no other pointers to the UMEM exist.
                unsafe { XskUmem::new(umem_ptr) }
            }
            None => {
                return Err(UmemCreateError {
                    kind: UmemCreateErrorKind::RegistrationFailed,
                    reason: "returned UMEM pointer is null",
                    err: io::Error::from_raw_os_error(err),
                });
            }
        };

        if err != 0 {
            return Err(UmemCreateError {
                kind: UmemCreateErrorKind::RegistrationFailed,
                reason: "non-zero error code returned when creating UMEM",
                err: io::Error::from_raw_os_error(err),
            });
        }

        if fq.is_ring_null() {
            return Err(UmemCreateError {
                kind: UmemCreateErrorKind::RegistrationFailed,
                reason: "returned fill queue ring is null",
                err: io::Error::from_raw_os_error(err),
            });
        };

        if cq.is_ring_null() {
            return Err(UmemCreateError {
                kind: UmemCreateErrorKind::RegistrationFailed,
                reason: "returned comp queue ring is null",
                err: io::Error::from_raw_os_error(err),
            });
        }

        let inner = UmemInner::new(umem_ptr, Some((fq, cq)));

        let frame_count = frame_count.get() as usize;

        let mut frame_descs: Vec<FrameDesc> = Vec::with_capacity(frame_count);

        for i in 0..frame_count {
            let addr = i * frame_layout.frame_size();
            frame_descs.push(FrameDesc::new(addr));
        }

        let umem = Umem {
            inner: Arc::new(Mutex::new(inner)),
            mem,
        };

        Ok((umem, frame_descs))
    }

    /// Intended to be called on socket creation: hands the create function
    /// a pointer to the UMEM and any saved fill/completion queue the C API
    /// produced as a byproduct of [`Umem::new`], so they aren't leaked.
    #[inline]
    pub(crate) fn with_ptr_and_saved_queues<F, T>(&self, mut f: F) -> T
    where
        F: FnMut(*mut xsk_umem, &mut Option<(XskRingProd, XskRingCons)>) -> T,
    {
        let mut inner = self.inner.lock().unwrap();

        f(inner.umem_ptr.as_mut_ptr(), &mut inner.saved_fq_and_cq)
    }
}

/// Distinguishes a failure to allocate the backing mmap region from a
/// failure registering that region with the kernel, so callers can map
/// each to the right [`XskBounceError`](crate::error::XskBounceError) variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmemCreateErrorKind {
    AllocFailed,
    RegistrationFailed,
}

/// Error detailing why [`Umem`] creation failed.
#[derive(Debug)]
pub struct UmemCreateError {
    kind: UmemCreateErrorKind,
    reason: &'static str,
    err: io::Error,
}

impl UmemCreateError {
    pub fn kind(&self) -> UmemCreateErrorKind {
        self.kind
    }
}

impl fmt::Display for UmemCreateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl Error for UmemCreateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.err.borrow())
    }
}

impl From<UmemCreateError> for crate::error::XskBounceError {
    fn from(e: UmemCreateError) -> Self {
        match e.kind {
            UmemCreateErrorKind::AllocFailed => crate::error::ResourceError {
                reason: e.reason,
                err: e.err,
            }
            .into(),
            UmemCreateErrorKind::RegistrationFailed => crate::error::KernelError {
                reason: e.reason,
                err: e.err,
            }
            .into(),
        }
    }
}

/// Dimensions of a [`Umem`] frame: the kernel-mandated headroom, the
/// configured extra headroom, and the usable packet payload.
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    #[allow(dead_code)]
    xdp_headroom: usize,
    #[allow(dead_code)]
    frame_headroom: usize,
    #[allow(dead_code)]
    mtu: usize,
    frame_size: usize,
}

impl FrameLayout {
    fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl From<UmemConfig> for FrameLayout {
    fn from(c: UmemConfig) -> Self {
        let xdp_headroom = libbpf_sys::XDP_PACKET_HEADROOM as usize;
        let frame_headroom = c.frame_headroom() as usize;
        let mtu = c.mtu() as usize;

        Self {
            xdp_headroom,
            frame_headroom,
            mtu,
            frame_size: c.frame_size().get() as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_frame_size_equals_layout_frame_size() {
        let config = UmemConfig::default();
        let layout: FrameLayout = config.into();
        assert_eq!(layout.frame_size(), config.frame_size().get() as usize);
    }
}
