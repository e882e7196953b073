//! Loading and attaching the in-kernel redirect program.
//!
//! The loaded object must define a BPF map named `xsks_map` (an XSK map,
//! keyed by RX queue index, valued by AF_XDP socket descriptor) and an XDP
//! program that redirects into it. [`XdpLoader`] treats the program as
//! opaque beyond that contract - it never inspects instructions, only the
//! map and program names.

use std::{
    ffi::CString,
    os::raw::c_int,
    ptr,
};

use libbpf_sys::{bpf_object, bpf_program};

use crate::{
    config::{Interface, XdpFlags, XdpMode},
    error::{KernelError, ProgramError},
};

/// Name the kernel-program contract requires the redirect map to have.
const XSKS_MAP_NAME: &str = "xsks_map";

/// Owns the loaded BPF object and its attachment to an interface. Detaches
/// and releases the object on drop.
pub struct XdpLoader {
    obj: *mut bpf_object,
    prog: *mut bpf_program,
    xsks_map_fd: c_int,
    ifindex: c_int,
    attached: bool,
}

unsafe impl Send for XdpLoader {}

impl XdpLoader {
    /// Opens and loads the object at `path`, resolving the redirect program
    /// (by `prog_name`) and the `xsks_map` map. Does not attach - call
    /// [`attach`](Self::attach) once the interface is known.
    pub fn load(path: &str, prog_name: &str) -> Result<Self, LoadError> {
        let path_c =
            CString::new(path).map_err(|_| LoadError::Program(ProgramError::new(
                "object path contains an interior nul byte",
            )))?;
        let prog_name_c = CString::new(prog_name).map_err(|_| {
            LoadError::Program(ProgramError::new(
                "program name contains an interior nul byte",
            ))
        })?;

        // SAFETY: `path_c` and `prog_name_c` are valid, nul-terminated C
        // strings that outlive these calls. `obj` is checked for null
        // before any further use.
        let obj = unsafe { libbpf_sys::bpf_object__open(path_c.as_ptr()) };

        if obj.is_null() {
            return Err(LoadError::Kernel(KernelError {
                reason: "bpf_object__open returned null",
                err: std::io::Error::last_os_error(),
            }));
        }

        // SAFETY: `obj` was just checked non-null.
        let load_ret = unsafe { libbpf_sys::bpf_object__load(obj) };

        if load_ret != 0 {
            unsafe { libbpf_sys::bpf_object__close(obj) };
            return Err(LoadError::Kernel(KernelError {
                reason: "bpf_object__load failed",
                err: std::io::Error::from_raw_os_error(-load_ret),
            }));
        }

        // SAFETY: `obj` is loaded; `prog_name_c` is a valid C string.
        let prog =
            unsafe { libbpf_sys::bpf_object__find_program_by_name(obj, prog_name_c.as_ptr()) };

        if prog.is_null() {
            unsafe { libbpf_sys::bpf_object__close(obj) };
            return Err(LoadError::Program(ProgramError::new(format!(
                "redirect program \"{}\" not found in object",
                prog_name
            ))));
        }

        let xsks_map_name_c = CString::new(XSKS_MAP_NAME).expect("static name has no nul bytes");

        // SAFETY: `obj` is loaded; `xsks_map_name_c` is a valid C string.
        let xsks_map =
            unsafe { libbpf_sys::bpf_object__find_map_by_name(obj, xsks_map_name_c.as_ptr()) };

        if xsks_map.is_null() {
            unsafe { libbpf_sys::bpf_object__close(obj) };
            return Err(LoadError::Program(ProgramError::new(
                "object does not define the required \"xsks_map\" map",
            )));
        }

        // SAFETY: `xsks_map` was just checked non-null.
        let xsks_map_fd = unsafe { libbpf_sys::bpf_map__fd(xsks_map) };

        if xsks_map_fd < 0 {
            unsafe { libbpf_sys::bpf_object__close(obj) };
            return Err(LoadError::Program(ProgramError::new(
                "xsks_map has no associated file descriptor",
            )));
        }

        Ok(Self {
            obj,
            prog,
            xsks_map_fd,
            ifindex: 0,
            attached: false,
        })
    }

    /// Attaches the loaded program to `if_name` at `mode`. `Auto` tries the
    /// native (driver) hook first and retries once in generic (SKB) mode on
    /// failure; an explicit mode is never retried.
    pub fn attach(&mut self, if_name: &Interface, mode: XdpMode) -> Result<(), KernelError> {
        let ifindex = unsafe { libc::if_nametoindex(if_name.as_cstr().as_ptr()) };

        if ifindex == 0 {
            return Err(KernelError {
                reason: "interface name does not resolve to an index",
                err: std::io::Error::last_os_error(),
            });
        }

        let ifindex = ifindex as c_int;

        // SAFETY: `self.prog` was resolved and checked non-null in `load`.
        let prog_fd = unsafe { libbpf_sys::bpf_program__fd(self.prog) };

        let primary_flags = mode.xdp_flags().bits();

        let ret = unsafe { libbpf_sys::bpf_set_link_xdp_fd(ifindex, prog_fd, primary_flags) };

        if ret == 0 {
            self.ifindex = ifindex;
            self.attached = true;
            return Ok(());
        }

        if mode != XdpMode::Auto {
            return Err(KernelError {
                reason: "XDP attach failed",
                err: std::io::Error::from_raw_os_error(-ret),
            });
        }

        log::warn!("native-mode XDP attach failed, retrying in generic mode");

        let generic_flags = XdpFlags::XDP_FLAGS_SKB_MODE.bits();
        let retry = unsafe { libbpf_sys::bpf_set_link_xdp_fd(ifindex, prog_fd, generic_flags) };

        if retry != 0 {
            return Err(KernelError {
                reason: "XDP attach failed in both native and generic mode",
                err: std::io::Error::from_raw_os_error(-retry),
            });
        }

        self.ifindex = ifindex;
        self.attached = true;
        Ok(())
    }

    /// Inserts `socket_fd` into `xsks_map` at `queue_id`, making it a valid
    /// redirect target for the attached program.
    pub fn register_socket(&self, queue_id: u32, socket_fd: c_int) -> Result<(), KernelError> {
        let queue_id = queue_id;

        // SAFETY: `self.xsks_map_fd` is a valid map fd resolved in `load`;
        // `queue_id` and `socket_fd` are plain-old-data values passed by
        // pointer as `bpf_map_update_elem` requires.
        let ret = unsafe {
            libbpf_sys::bpf_map_update_elem(
                self.xsks_map_fd,
                &queue_id as *const u32 as *const _,
                &socket_fd as *const c_int as *const _,
                0,
            )
        };

        if ret != 0 {
            return Err(KernelError {
                reason: "failed to insert socket into xsks_map",
                err: std::io::Error::from_raw_os_error(-ret),
            });
        }

        Ok(())
    }
}

impl Drop for XdpLoader {
    fn drop(&mut self) {
        if self.attached {
            // SAFETY: `self.ifindex` was resolved and validated in `attach`.
            let ret = unsafe { libbpf_sys::bpf_set_link_xdp_fd(self.ifindex, -1, 0) };
            if ret != 0 {
                log::error!("failed to detach XDP program, error code {}", ret);
            }
        }

        if !self.obj.is_null() {
            // SAFETY: `self.obj` is non-null and owned exclusively by this
            // loader.
            unsafe { libbpf_sys::bpf_object__close(self.obj) };
        }

        self.obj = ptr::null_mut();
    }
}

/// Failure loading or resolving the redirect object.
#[derive(Debug)]
pub enum LoadError {
    Kernel(KernelError),
    Program(ProgramError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Kernel(e) => write!(f, "{}", e),
            LoadError::Program(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Kernel(e) => Some(e),
            LoadError::Program(e) => Some(e),
        }
    }
}

impl From<LoadError> for crate::error::XskBounceError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Kernel(e) => e.into(),
            LoadError::Program(e) => e.into(),
        }
    }
}
