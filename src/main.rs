//! `xsk-bounce`: a single-socket, single-queue zero-copy AF_XDP bounce.
//!
//! Every frame received on `(ifname, queue_id)` is immediately queued back
//! out the same interface, using one UMEM region for both directions.

use std::{os::unix::io::AsRawFd, time::Duration};

use xsk_bounce::{
    cli::{Args, Config},
    config::{BindFlags, LibbpfFlags, SocketConfig},
    engine::Engine,
    error::{KernelError, XskBounceError},
    pool::FramePool,
    signal::{self, StopFlag},
    socket::{self, Socket},
    stats::StatsReporter,
    umem::{frame::FrameDesc, Umem},
    xdp::XdpLoader,
};

fn main() {
    env_logger::init();

    let args = Args::parse_or_exit();

    match run(args) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("xsk-bounce: {} failed: {}", e.stage(), e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run(args: Args) -> Result<(), XskBounceError> {
    let config = Config::from_args(args)?;

    let mut loader = XdpLoader::load(&config.program_path, &config.program_name)?;
    loader.attach(&config.interface, config.xdp_mode)?;

    let (umem, frame_descs) = Umem::new(config.umem_config, config.frame_count, false)?;

    let mut pool = FramePool::from_addrs(frame_descs.iter().map(|d| d.addr as u64));

    // Our own `XdpLoader` already loaded and attached the redirect
    // program, so libbpf must not try to load its own default one on
    // socket creation.
    let bind_flags = config.bind_mode.bind_flags() | BindFlags::XDP_USE_NEED_WAKEUP;
    let socket_config = SocketConfig::builder()
        .rx_queue_size(config.socket_config.rx_queue_size())
        .tx_queue_size(config.socket_config.tx_queue_size())
        .libbpf_flags(LibbpfFlags::XSK_LIBBPF_FLAGS_INHIBIT_PROG_LOAD)
        .bind_flags(bind_flags)
        .build();

    // SAFETY: this UMEM was just created above and is bound to exactly
    // one socket.
    let (tx_q, rx_q, fq_and_cq) =
        unsafe { Socket::new(socket_config, &umem, &config.interface, config.queue_id) }?;

    let raw_fd = rx_q.fd().as_raw_fd();

    let (mut fq, cq) = fq_and_cq.ok_or_else(|| {
        XskBounceError::from(KernelError {
            reason: "socket creation did not return a fill/completion queue pair",
            err: std::io::Error::new(std::io::ErrorKind::Other, "missing fq/cq"),
        })
    })?;

    loader.register_socket(config.queue_id, raw_fd)?;

    // Prime the Fill ring with exactly FILL_RING_SIZE frames - `fq.produce`
    // is all-or-nothing, so offering the whole pool (which is always far
    // larger than the ring) would be refused in full and leave the ring
    // empty.
    let fill_ring_size = config.umem_config.fill_queue_size().get() as usize;
    let mut priming = Vec::with_capacity(fill_ring_size);
    for _ in 0..fill_ring_size {
        match pool.alloc() {
            Some(addr) => priming.push(FrameDesc::new(addr as usize)),
            None => break,
        }
    }
    let primed = unsafe { fq.produce(&priming) };
    for desc in &priming[primed..] {
        pool.free(desc.addr as u64)
            .expect("frame pool overflow on startup priming");
    }

    let stop = StopFlag::new();
    signal::install(stop.clone()).map_err(|e| {
        XskBounceError::from(KernelError {
            reason: "failed to install signal handler",
            err: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })
    })?;

    let mut engine = Engine::new(
        rx_q,
        tx_q,
        fq,
        cq,
        pool,
        config.poll_mode,
        config.limits,
        stop.clone(),
    );

    let stats_handle = if config.stats_enabled {
        let reporter =
            StatsReporter::new(engine.counters(), stop.clone(), Duration::from_secs(1));
        Some(reporter.spawn())
    } else {
        None
    };

    engine.run().map_err(|e| {
        XskBounceError::from(KernelError {
            reason: "engine loop failed",
            err: e,
        })
    })?;

    stop.set();
    if let Some(handle) = stats_handle {
        let _ = handle.join();
    }

    if config.stats_enabled {
        match socket::xdp_statistics_for_raw_fd(raw_fd) {
            Ok(stats) => log::info!(
                "final kernel stats: rx_dropped={} rx_ring_full={} rx_invalid={} tx_invalid={}",
                stats.rx_dropped(),
                stats.rx_ring_full(),
                stats.rx_invalid_descs(),
                stats.tx_invalid_descs(),
            ),
            Err(e) => log::warn!("could not read final kernel statistics: {}", e),
        }
    }

    Ok(())
}
