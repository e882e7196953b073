//! Cooperative shutdown signalling.
//!
//! A common pitfall in this style of signal handling is publishing a
//! process-wide pointer *after* installing the handler, leaving a window
//! where a signal delivered mid-install dereferences a half-built
//! context. [`StopFlag`] sidesteps that rather than patching around it -
//! the shared flag is constructed first and moved into the handler
//! closure directly, so there is no raw global pointer to publish and no
//! window in which it can be read uninitialized. The handler closure is
//! the process-wide slot, and `ctrlc::set_handler` is the install step;
//! ordering them correctly is automatic as long as the flag is built
//! before `install` is called, which every caller in this crate does.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A one-shot flag observed at the top of every [`Engine`](crate::engine::Engine)
/// batch iteration and every [`StatsReporter`](crate::stats::StatsReporter) tick.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::Release)
    }
}

/// Installs a handler for both `SIGINT` and `SIGTERM` that sets `flag`.
/// Idempotent: repeated signals just re-set an already-set flag.
///
/// `flag` must already be shared with every consumer (the engine, the
/// stats reporter) before this call - that's what gives the
/// allocate-then-publish-then-install ordering its safety.
pub fn install(flag: StopFlag) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        flag.set();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear_and_latches_once_set() {
        let flag = StopFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }

    #[test]
    fn clones_observe_the_same_flag() {
        let flag = StopFlag::new();
        let clone = flag.clone();
        flag.set();
        assert!(clone.is_set());
    }
}
