use crate::cancel::Cancellation;
use crate::device::ioctl::{self, ControlSocket};
use crate::device::{Device, DeviceFlags, InterfaceConfig, Mode};
use crate::{Error, MacAddr, Result};
use nix::net::if_::InterfaceFlags;
use nix::unistd::{getegid, geteuid};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::unix::AsyncFd;
use tracing::{debug, info};

/// A kernel TUN/TAP interface.
///
/// `read` and `write` may run concurrently from different tasks. The
/// administrative calls (`up`, `down`, `set_address`, `set_mtu`,
/// `set_hardware_address`) each do an unsynchronized read-modify-write of
/// kernel state and must not race each other on the same interface.
pub struct VirtualInterface {
    handle: Mutex<Option<Arc<AsyncFd<File>>>>,
    closed: Cancellation,
    name: String,
    flags: DeviceFlags,
    snapshot: Mutex<InterfaceFlags>,
}

impl VirtualInterface {
    /// Open the device node, bind it to an interface and hand it to the
    /// current user. Fails with [`Error::NoRuntime`] outside a Tokio runtime.
    pub(crate) fn create(config: &InterfaceConfig) -> Result<Self> {
        require_runtime()?;
        let path = config.path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        let requested = config.requested_name().unwrap_or("");
        let name = ioctl::set_iff(file.as_raw_fd(), requested, config.flags())
            .map_err(|e| setup_error(path, config.flags(), e))?;

        if config.owner_enabled() {
            ioctl::set_owner(file.as_raw_fd(), geteuid().as_raw())
                .map_err(|e| setup_error(path, config.flags(), e))?;
            ioctl::set_group(file.as_raw_fd(), getegid().as_raw())
                .map_err(|e| setup_error(path, config.flags(), e))?;
        }

        info!(name = %name, flags = %config.flags(), "virtual interface created");
        Self::from_file(file, name, config.flags())
    }

    /// Wrap an already bound, non-blocking device file.
    pub(crate) fn from_file(file: File, name: String, flags: DeviceFlags) -> Result<Self> {
        require_runtime()?;
        let fd = AsyncFd::new(file)?;
        Ok(Self {
            handle: Mutex::new(Some(Arc::new(fd))),
            closed: Cancellation::new(),
            name,
            flags,
            snapshot: Mutex::new(InterfaceFlags::empty()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_flags(&self) -> DeviceFlags {
        self.flags
    }

    /// TAP unless the interface was created with the TUN bit alone.
    pub fn mode(&self) -> Mode {
        self.flags.mode().unwrap_or(Mode::Tap)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn handle(&self) -> Result<Arc<AsyncFd<File>>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Closed)
    }

    /// Read one frame. Waits until a frame is pending or the interface is closed.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.handle()?;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(Error::Closed),
            res = read_frame(&fd, buf) => res.map_err(Error::from),
        }
    }

    /// Submit one frame. The returned count may be short; callers decide
    /// whether that is fatal.
    pub async fn write(&self, frame: &[u8]) -> Result<usize> {
        let fd = self.handle()?;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(Error::Closed),
            res = write_frame(&fd, frame) => res.map_err(Error::from),
        }
    }

    /// Release the device. Pending and later calls fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let fd = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::Closed)?;
        self.closed.cancel();
        // in-flight reads hold their own reference until they observe the close
        drop(fd);
        info!(name = %self.name, "virtual interface closed");
        Ok(())
    }

    fn control(&self) -> Result<ControlSocket> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        ControlSocket::open()
    }

    /// Set the administrative up flag.
    pub fn up(&self) -> Result<()> {
        let sock = self.control()?;
        let current = sock.flags(&self.name)?;
        let next = current | InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING;
        sock.set_flags(&self.name, next)?;
        self.store_snapshot(next);
        debug!(name = %self.name, flags = ?next, "interface up");
        Ok(())
    }

    pub fn down(&self) -> Result<()> {
        let sock = self.control()?;
        let current = sock.flags(&self.name)?;
        let next = current & !(InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING);
        sock.set_flags(&self.name, next)?;
        self.store_snapshot(next);
        debug!(name = %self.name, flags = ?next, "interface down");
        Ok(())
    }

    /// Current kernel flags. Refreshes the cached snapshot.
    pub fn flags(&self) -> Result<InterfaceFlags> {
        let flags = self.control()?.flags(&self.name)?;
        self.store_snapshot(flags);
        Ok(flags)
    }

    /// Flags as last read or written by this handle, without asking the kernel.
    pub fn last_flags(&self) -> InterfaceFlags {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_up(&self) -> Result<bool> {
        Ok(self.flags()?.contains(InterfaceFlags::IFF_UP))
    }

    fn store_snapshot(&self, flags: InterfaceFlags) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = flags;
    }

    /// Assign an IPv4 address, then its netmask. The address is briefly
    /// live with the kernel's default mask between the two requests.
    pub fn set_address(&self, ip: Ipv4Addr, mask: Ipv4Addr) -> Result<()> {
        let sock = self.control()?;
        sock.set_address(&self.name, ip)?;
        sock.set_netmask(&self.name, mask)?;
        debug!(name = %self.name, %ip, %mask, "address assigned");
        Ok(())
    }

    pub fn address(&self) -> Result<Ipv4Addr> {
        self.control()?.address(&self.name)
    }

    pub fn netmask(&self) -> Result<Ipv4Addr> {
        self.control()?.netmask(&self.name)
    }

    pub fn set_mtu(&self, mtu: u32) -> Result<()> {
        let sock = self.control()?;
        let previous = sock.mtu(&self.name)?;
        sock.set_mtu(&self.name, mtu)?;
        debug!(name = %self.name, previous, mtu, "mtu set");
        Ok(())
    }

    pub fn mtu(&self) -> Result<u32> {
        self.control()?.mtu(&self.name)
    }

    /// Set the link-layer address. Only meaningful for TAP interfaces.
    pub fn set_hardware_address(&self, mac: MacAddr) -> Result<()> {
        let sock = self.control()?;
        if self.mode() != Mode::Tap {
            return Err(Error::NotLinkLayer);
        }
        let previous = sock.hardware_address(&self.name)?;
        sock.set_hardware_address(&self.name, mac)?;
        debug!(name = %self.name, %previous, %mac, "hardware address set");
        Ok(())
    }

    pub fn hardware_address(&self) -> Result<MacAddr> {
        let sock = self.control()?;
        if self.mode() != Mode::Tap {
            return Err(Error::NotLinkLayer);
        }
        sock.hardware_address(&self.name)
    }
}

impl Device for VirtualInterface {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.read(buf).await
    }

    async fn send(&self, frame: &[u8]) -> Result<usize> {
        self.write(frame).await
    }

    fn mode(&self) -> Mode {
        VirtualInterface::mode(self)
    }
}

impl std::fmt::Debug for VirtualInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualInterface")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_frame(fd: &AsyncFd<File>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut guard = fd.readable().await?;
        match guard.try_io(|inner| {
            let mut file: &File = inner.get_ref();
            file.read(buf)
        }) {
            Ok(res) => return res,
            Err(_would_block) => continue,
        }
    }
}

async fn write_frame(fd: &AsyncFd<File>, frame: &[u8]) -> io::Result<usize> {
    loop {
        let mut guard = fd.writable().await?;
        match guard.try_io(|inner| {
            let mut file: &File = inner.get_ref();
            file.write(frame)
        }) {
            Ok(res) => return res,
            Err(_would_block) => continue,
        }
    }
}

// AsyncFd::new panics without a reactor
fn require_runtime() -> Result<()> {
    tokio::runtime::Handle::try_current()
        .map(drop)
        .map_err(|_| Error::NoRuntime)
}

fn open_error(path: &Path, source: io::Error) -> Error {
    match source.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => Error::PermissionDenied { source },
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EBUSY) => {
            Error::DeviceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        }
        _ => Error::Io(source),
    }
}

/// Classify a rejected set-interface or owner request.
fn setup_error(path: &Path, flags: DeviceFlags, err: Error) -> Error {
    let errno = match err {
        Error::Control { source, .. } => source,
        other => return other,
    };
    let source = io::Error::from(errno);
    match errno {
        nix::Error::EPERM | nix::Error::EACCES => Error::PermissionDenied { source },
        nix::Error::EINVAL => Error::InvalidFlagCombination { flags, source },
        nix::Error::EBUSY | nix::Error::ENODEV => Error::DeviceUnavailable {
            path: path.to_path_buf(),
            source,
        },
        _ => Error::Io(source),
    }
}
