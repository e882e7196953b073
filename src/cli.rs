//! Command-line surface and the validated [`Config`] built from it.
//!
//! Short flags only, matching the flag table - positional order doesn't
//! matter, and every flag listed is parsed before any kernel resource is
//! touched.

use std::{num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;

use crate::{
    config::{BindMode, Interface, SocketConfig, UmemConfig, XdpMode},
    engine::{EngineLimits, PollMode},
    error::ConfigError,
};

/// Built-in redirect object shipped alongside the binary, used when `-f`
/// is not given.
pub const DEFAULT_PROGRAM_PATH: &str = "/usr/local/lib/xsk-bounce/xdp_redirect.o";

/// Entry point name inside [`DEFAULT_PROGRAM_PATH`], used when `-P` is not
/// given.
pub const DEFAULT_PROGRAM_NAME: &str = "xdp_redirect";

/// Frames carved out of the UMEM region. Must cover the default Fill, RX,
/// TX and Completion ring sizes (2048 each) plus a batch's worth of slack,
/// per the spec's `N_FRAMES >= FILL + RX + TX + COMP + batch` invariant -
/// see `Config::from_args`'s check against whatever ring sizes are in play.
const DEFAULT_FRAME_COUNT: u32 = 16384;

#[derive(Parser, Debug)]
#[command(name = "xsk-bounce", disable_help_flag = true)]
pub struct Args {
    /// Interface name
    #[arg(short = 'd', default_value = "eth0")]
    pub ifname: String,

    /// RX queue index
    #[arg(short = 'Q', default_value_t = 0)]
    pub queue_id: u32,

    /// Attach in generic (SKB) mode, implies copy bind
    #[arg(short = 'S')]
    pub generic_mode: bool,

    /// Attach in native driver mode
    #[arg(short = 'N')]
    pub native_mode: bool,

    /// Force copy bind
    #[arg(short = 'c')]
    pub force_copy: bool,

    /// Force zero-copy bind
    #[arg(short = 'z')]
    pub force_zerocopy: bool,

    /// Cooperative wait mode (default busy-wait)
    #[arg(short = 'p')]
    pub cooperative: bool,

    /// Override redirect-program object file
    #[arg(short = 'f')]
    pub program_path: Option<String>,

    /// Override program entry name
    #[arg(short = 'P')]
    pub program_name: Option<String>,

    /// Enable stats reporter
    #[arg(short = 'v')]
    pub stats: bool,

    /// TTL auto-shutdown, in seconds
    #[arg(short = 't')]
    pub ttl_secs: Option<u64>,

    /// Packet-count auto-shutdown
    #[arg(short = 'l')]
    pub packet_limit: Option<u64>,

    /// Print usage
    #[arg(short = 'h', action = clap::ArgAction::SetTrue)]
    pub help: bool,
}

impl Args {
    /// Parses `argv`, short-circuiting on `-h`/`--help` with exit code 1
    /// rather than clap's usual 0 - the flag table calls for "usage + exit
    /// code 1" explicitly, so help can't be left to clap's default
    /// handling.
    pub fn parse_or_exit() -> Self {
        let args = Self::parse();

        if args.help {
            let _ = <Self as clap::CommandFactory>::command().print_help();
            println!();
            std::process::exit(1);
        }

        args
    }
}

/// The fully validated, ready-to-use runtime configuration.
pub struct Config {
    pub interface: Interface,
    pub queue_id: u32,
    pub xdp_mode: XdpMode,
    pub bind_mode: BindMode,
    pub poll_mode: PollMode,
    pub program_path: String,
    pub program_name: String,
    pub stats_enabled: bool,
    pub limits: EngineLimits,
    pub frame_count: NonZeroU32,
    pub umem_config: UmemConfig,
    pub socket_config: SocketConfig,
}

impl Config {
    /// Validates and assembles a [`Config`] from parsed [`Args`]. Every
    /// check here runs before any kernel resource is touched.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.native_mode && args.generic_mode {
            return Err(ConfigError::new("-N and -S are mutually exclusive"));
        }

        if args.force_copy && args.force_zerocopy {
            return Err(ConfigError::new("-c and -z are mutually exclusive"));
        }

        if args.force_zerocopy && args.generic_mode {
            return Err(ConfigError::new(
                "-z (force zero-copy) conflicts with -S (generic mode implies copy)",
            ));
        }

        let interface = Interface::from_str(&args.ifname)
            .map_err(|_| ConfigError::new("interface name contains a nul byte"))?;

        let xdp_mode = if args.native_mode {
            XdpMode::Native
        } else if args.generic_mode {
            XdpMode::Generic
        } else {
            XdpMode::Auto
        };

        let bind_mode = if args.force_zerocopy {
            BindMode::ZeroCopy
        } else if args.force_copy || args.generic_mode {
            BindMode::Copy
        } else {
            BindMode::Auto
        };

        let poll_mode = if args.cooperative {
            PollMode::Cooperative
        } else {
            PollMode::Busy
        };

        let limits = EngineLimits {
            ttl: args.ttl_secs.map(Duration::from_secs),
            packet_limit: args.packet_limit,
        };

        let program_path = args
            .program_path
            .unwrap_or_else(|| DEFAULT_PROGRAM_PATH.to_string());
        let program_name = args
            .program_name
            .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());

        let umem_config = UmemConfig::builder()
            .build()
            .map_err(|e| ConfigError::new(e.to_string()))?;
        let socket_config = SocketConfig::builder().build();

        let frame_count = NonZeroU32::new(DEFAULT_FRAME_COUNT)
            .expect("DEFAULT_FRAME_COUNT is a nonzero constant");

        // Spec invariant: N_FRAMES >= FILL + RX + TX + COMP + batch, or the
        // Fill ring can never be kept full and reception stalls permanently.
        let required = umem_config
            .fill_queue_size()
            .get()
            .saturating_add(socket_config.rx_queue_size().get())
            .saturating_add(socket_config.tx_queue_size().get())
            .saturating_add(umem_config.comp_queue_size().get())
            .saturating_add(crate::engine::RX_BATCH_SIZE as u32);

        if frame_count.get() < required {
            return Err(ConfigError::new(format!(
                "frame count {} is below the minimum {} required to cover \
                 fill ({}) + rx ({}) + tx ({}) + completion ({}) ring capacity plus a batch",
                frame_count.get(),
                required,
                umem_config.fill_queue_size().get(),
                socket_config.rx_queue_size().get(),
                socket_config.tx_queue_size().get(),
                umem_config.comp_queue_size().get(),
            )));
        }

        Ok(Self {
            interface,
            queue_id: args.queue_id,
            xdp_mode,
            bind_mode,
            poll_mode,
            program_path,
            program_name,
            stats_enabled: args.stats,
            limits,
            frame_count,
            umem_config,
            socket_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            ifname: "eth0".into(),
            queue_id: 0,
            generic_mode: false,
            native_mode: false,
            force_copy: false,
            force_zerocopy: false,
            cooperative: false,
            program_path: None,
            program_name: None,
            stats: false,
            ttl_secs: None,
            packet_limit: None,
            help: false,
        }
    }

    #[test]
    fn native_and_generic_conflict() {
        let mut args = base_args();
        args.native_mode = true;
        args.generic_mode = true;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn copy_and_zerocopy_conflict() {
        let mut args = base_args();
        args.force_copy = true;
        args.force_zerocopy = true;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn defaults_produce_auto_modes() {
        let args = base_args();
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.xdp_mode, XdpMode::Auto);
        assert_eq!(config.bind_mode, BindMode::Auto);
        assert_eq!(config.poll_mode, PollMode::Busy);
    }

    #[test]
    fn generic_mode_implies_copy_bind() {
        let mut args = base_args();
        args.generic_mode = true;
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.bind_mode, BindMode::Copy);
    }

    #[test]
    fn default_frame_count_covers_default_ring_sizes_plus_a_batch() {
        let args = base_args();
        let config = Config::from_args(args).unwrap();
        let required = config.umem_config.fill_queue_size().get()
            + config.socket_config.rx_queue_size().get()
            + config.socket_config.tx_queue_size().get()
            + config.umem_config.comp_queue_size().get()
            + crate::engine::RX_BATCH_SIZE as u32;
        assert!(config.frame_count.get() >= required);
    }
}
