use crate::device::VirtualInterface;
use crate::Result;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::path::{Path, PathBuf};

/// Default character device for TUN/TAP allocation.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/net/tun";

/// Flags carried by the set-interface request (`TUNSETIFF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceFlags(u16);

impl DeviceFlags {
    /// IP-layer device, frames are raw IP packets
    pub const TUN: DeviceFlags = DeviceFlags(libc::IFF_TUN as u16);
    /// Link-layer device, frames are raw Ethernet frames
    pub const TAP: DeviceFlags = DeviceFlags(libc::IFF_TAP as u16);
    /// Do not prepend the 4-byte packet information header
    pub const NO_PI: DeviceFlags = DeviceFlags(libc::IFF_NO_PI as u16);
    /// One file descriptor per queue
    pub const MULTI_QUEUE: DeviceFlags = DeviceFlags(libc::IFF_MULTI_QUEUE as u16);

    pub const fn empty() -> Self {
        DeviceFlags(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: DeviceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The link mode these flags select, if exactly one mode bit is set.
    pub fn mode(self) -> Option<Mode> {
        match (self.contains(Self::TUN), self.contains(Self::TAP)) {
            (true, false) => Some(Mode::Tun),
            (false, true) => Some(Mode::Tap),
            _ => None,
        }
    }
}

impl BitOr for DeviceFlags {
    type Output = DeviceFlags;

    fn bitor(self, rhs: DeviceFlags) -> DeviceFlags {
        DeviceFlags(self.0 | rhs.0)
    }
}

impl BitAnd for DeviceFlags {
    type Output = DeviceFlags;

    fn bitand(self, rhs: DeviceFlags) -> DeviceFlags {
        DeviceFlags(self.0 & rhs.0)
    }
}

impl Not for DeviceFlags {
    type Output = DeviceFlags;

    fn not(self) -> DeviceFlags {
        DeviceFlags(!self.0)
    }
}

impl fmt::Display for DeviceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{} (0x{:04x})",
            if self.contains(Self::TUN) { "U" } else { "-" },
            if self.contains(Self::TAP) { "A" } else { "-" },
            if self.contains(Self::NO_PI) { "N" } else { "-" },
            if self.contains(Self::MULTI_QUEUE) { "M" } else { "-" },
            self.0
        )
    }
}

/// Which layer the virtual interface operates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// IP layer
    Tun,
    /// Link layer
    Tap,
}

impl Mode {
    fn flag(self) -> DeviceFlags {
        match self {
            Mode::Tun => DeviceFlags::TUN,
            Mode::Tap => DeviceFlags::TAP,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tun => write!(f, "tun"),
            Mode::Tap => write!(f, "tap"),
        }
    }
}

/// Configuration for a new virtual interface.
///
/// Every setter takes the configuration by value and hands back the updated
/// copy, so a partially built configuration can be cloned and branched
/// without the branches seeing each other's changes. Nothing touches the
/// kernel until [`InterfaceConfig::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    flags: DeviceFlags,
    name: Option<String>,
    path: PathBuf,
    set_owner: bool,
}

impl InterfaceConfig {
    pub fn new() -> Self {
        Self {
            flags: DeviceFlags::empty(),
            name: None,
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
            set_owner: true,
        }
    }

    /// Select link-layer mode, dropping the TUN bit if present.
    pub fn tap(self) -> Self {
        self.mode(Mode::Tap)
    }

    /// Select IP-layer mode, dropping the TAP bit if present.
    pub fn tun(self) -> Self {
        self.mode(Mode::Tun)
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.flags = (self.flags & !(DeviceFlags::TUN | DeviceFlags::TAP)) | mode.flag();
        self
    }

    pub fn no_packet_info(self) -> Self {
        self.flag(DeviceFlags::NO_PI)
    }

    pub fn multi_queue(self) -> Self {
        self.flag(DeviceFlags::MULTI_QUEUE)
    }

    /// OR a raw flag into the mask. No validation happens here; the kernel
    /// decides whether the combination is acceptable.
    pub fn flag(mut self, flag: DeviceFlags) -> Self {
        self.flags = self.flags | flag;
        self
    }

    /// Request a specific interface name. An empty name lets the kernel pick.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.is_empty() { None } else { Some(name) };
        self
    }

    /// Character device to open instead of [`DEFAULT_DEVICE_PATH`].
    pub fn device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Whether to hand the device to the effective uid/gid after creation.
    pub fn set_owner(mut self, enabled: bool) -> Self {
        self.set_owner = enabled;
        self
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn requested_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner_enabled(&self) -> bool {
        self.set_owner
    }

    /// Allocate the device and apply this configuration.
    pub fn build(&self) -> Result<VirtualInterface> {
        VirtualInterface::create(self)
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self::new()
    }
}
