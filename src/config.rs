//! Command-line configuration for the `tapwire` binary.

use crate::device::{InterfaceConfig, Mode, DEFAULT_DEVICE_PATH};
use crate::frame::{self, DEFAULT_MTU};
use crate::mac::ParseMacError;
use crate::MacAddr;
use clap::{Args, Parser, Subcommand};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "tapwire")]
#[command(about = "Point-to-point TUN/TAP tunnel over UDP", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for a peer to send the admission token, then relay to it
    Server(ServerArgs),
    /// Send the admission token to a server, then relay to it
    Client(ClientArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// UDP address to listen on
    #[arg(long, default_value = "0.0.0.0:22122")]
    pub listen: SocketAddr,

    /// IPv4 address of the local interface
    #[arg(long, default_value = "10.0.0.1")]
    pub address: Ipv4Addr,

    #[command(flatten)]
    pub interface: InterfaceArgs,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server UDP address (e.g., 203.0.113.5:22122)
    #[arg(long)]
    pub server: SocketAddr,

    /// Local UDP address to bind
    #[arg(long, default_value = "0.0.0.0:0")]
    pub bind: SocketAddr,

    /// IPv4 address of the local interface
    #[arg(long, default_value = "10.0.0.2")]
    pub address: Ipv4Addr,

    #[command(flatten)]
    pub interface: InterfaceArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InterfaceArgs {
    /// TUN/TAP character device
    #[arg(long, default_value = DEFAULT_DEVICE_PATH)]
    pub device: PathBuf,

    /// Interface name; the kernel picks one when omitted
    #[arg(long)]
    pub name: Option<String>,

    /// Create an IP-layer (TUN) interface instead of TAP
    #[arg(long)]
    pub tun: bool,

    #[arg(long)]
    pub multi_queue: bool,

    #[arg(long, default_value = "255.255.255.0")]
    pub netmask: Ipv4Addr,

    #[arg(long, default_value_t = DEFAULT_MTU)]
    pub mtu: u32,

    /// Hardware address for TAP interfaces, or "random"
    #[arg(long)]
    pub mac: Option<MacSetting>,

    /// Admission token
    #[arg(long, default_value = "hello")]
    pub token: String,
}

impl InterfaceArgs {
    pub fn mode(&self) -> Mode {
        if self.tun {
            Mode::Tun
        } else {
            Mode::Tap
        }
    }

    pub fn config(&self) -> InterfaceConfig {
        let mut config = InterfaceConfig::new()
            .mode(self.mode())
            .no_packet_info()
            .device_path(self.device.clone());
        if self.multi_queue {
            config = config.multi_queue();
        }
        if let Some(name) = &self.name {
            config = config.name(name.clone());
        }
        config
    }

    /// Relay buffer size for the configured MTU and mode.
    pub fn capacity(&self) -> usize {
        frame::capacity(self.mtu, self.mode())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacSetting {
    Random,
    Fixed(MacAddr),
}

impl MacSetting {
    pub fn resolve(self) -> MacAddr {
        match self {
            MacSetting::Random => MacAddr::random_local(),
            MacSetting::Fixed(mac) => mac,
        }
    }
}

impl FromStr for MacSetting {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("random") {
            Ok(MacSetting::Random)
        } else {
            s.parse().map(MacSetting::Fixed)
        }
    }
}
