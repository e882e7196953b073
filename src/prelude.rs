//! Re-exports the types most callers need.

pub use super::{
    cli::{Args, Config},
    config::{
        BindFlags, BindMode, FrameSize, Interface, LibbpfFlags, QueueSize, SocketConfig,
        SocketConfigBuilder, UmemConfig, UmemConfigBuilder, XdpFlags, XdpMode,
    },
    engine::{Engine, EngineLimits, Lifecycle, PollMode},
    error::{ConfigError, KernelError, ProgramError, ResourceError, XskBounceError},
    pool::FramePool,
    signal::{install as install_signal_handler, StopFlag},
    socket::{RxQueue, Socket, TxQueue, XdpStatistics},
    stats::StatsReporter,
    umem::{frame::FrameDesc, CompQueue, FillQueue, Umem},
    xdp::XdpLoader,
};
