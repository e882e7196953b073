//! The error taxonomy used throughout the crate.
//!
//! Each kind mirrors one row of the initialization error table: a
//! [`ConfigError`] is raised before any kernel resource is touched, a
//! [`ResourceError`] or [`KernelError`] after a resource acquisition fails,
//! and a [`ProgramError`] when the loaded eBPF object doesn't satisfy the
//! socket-map contract. None of these are recoverable - on return from
//! `main` they map to a process exit code.
//!
//! Steady-state conditions (`TransientPacketDrop`, `BackpressureStall`) are
//! not represented here: they're absorbed into counters and log lines, per
//! the propagation policy. [`InvariantViolation`] likewise has no `Error`
//! type - it's a bug, and bugs panic.

use std::{borrow::Borrow, error::Error as StdError, fmt, io};

/// Bad or missing CLI flags, or an interface name that doesn't resolve.
#[derive(Debug)]
pub struct ConfigError {
    pub reason: String,
}

impl ConfigError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl StdError for ConfigError {}

/// Memory allocation or memory-lock limit failures.
#[derive(Debug)]
pub struct ResourceError {
    pub reason: &'static str,
    pub err: io::Error,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl StdError for ResourceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.err.borrow())
    }
}

/// UMEM registration, socket creation, XDP attach, or map-insert refused by
/// the kernel.
#[derive(Debug)]
pub struct KernelError {
    pub reason: &'static str,
    pub err: io::Error,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl StdError for KernelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.err.borrow())
    }
}

/// The redirect object is missing the required map or program.
#[derive(Debug)]
pub struct ProgramError {
    pub reason: String,
}

impl ProgramError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl StdError for ProgramError {}

/// Unifies the four initialization error kinds for `main`'s exit-code
/// mapping. Steady-state and invariant errors never appear here.
#[derive(Debug)]
pub enum XskBounceError {
    Config(ConfigError),
    Resource(ResourceError),
    Kernel(KernelError),
    Program(ProgramError),
}

impl XskBounceError {
    /// The stage name printed in the diagnostic line on stderr.
    pub fn stage(&self) -> &'static str {
        match self {
            XskBounceError::Config(_) => "configuration",
            XskBounceError::Resource(_) => "resource allocation",
            XskBounceError::Kernel(_) => "kernel setup",
            XskBounceError::Program(_) => "program contract",
        }
    }

    /// Negated raw OS error code when one is available, else a small fixed
    /// code identifying the failing kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            XskBounceError::Config(_) => 2,
            XskBounceError::Resource(e) => e.err.raw_os_error().map(|c| -c).unwrap_or(3),
            XskBounceError::Kernel(e) => e.err.raw_os_error().map(|c| -c).unwrap_or(4),
            XskBounceError::Program(_) => 5,
        }
    }
}

impl fmt::Display for XskBounceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XskBounceError::Config(e) => write!(f, "{}", e),
            XskBounceError::Resource(e) => write!(f, "{}", e),
            XskBounceError::Kernel(e) => write!(f, "{}", e),
            XskBounceError::Program(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for XskBounceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            XskBounceError::Config(e) => Some(e),
            XskBounceError::Resource(e) => Some(e),
            XskBounceError::Kernel(e) => Some(e),
            XskBounceError::Program(e) => Some(e),
        }
    }
}

impl From<ConfigError> for XskBounceError {
    fn from(e: ConfigError) -> Self {
        XskBounceError::Config(e)
    }
}

impl From<ResourceError> for XskBounceError {
    fn from(e: ResourceError) -> Self {
        XskBounceError::Resource(e)
    }
}

impl From<KernelError> for XskBounceError {
    fn from(e: KernelError) -> Self {
        XskBounceError::Kernel(e)
    }
}

impl From<ProgramError> for XskBounceError {
    fn from(e: ProgramError) -> Self {
        XskBounceError::Program(e)
    }
}
