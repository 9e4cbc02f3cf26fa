//! Kernel control requests for TUN/TAP devices.
//!
//! This is the only module that knows the byte layout of `struct ifreq`.
//! Everything above it deals in typed values: [`DeviceFlags`],
//! [`InterfaceFlags`], [`Ipv4Addr`], [`MacAddr`] and plain MTU integers.

use crate::device::DeviceFlags;
use crate::{Error, MacAddr, Result};
use nix::net::if_::InterfaceFlags;
use nix::sys::socket::{socket, AddressFamily, SockFlag, SockType};
use nix::{ioctl_readwrite_bad, ioctl_write_int_bad, ioctl_write_ptr_bad, request_code_write};
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

ioctl_readwrite_bad!(
    tun_set_iff,
    request_code_write!(b'T', 202, std::mem::size_of::<libc::c_int>()),
    Ifreq
);
ioctl_write_int_bad!(
    tun_set_owner,
    request_code_write!(b'T', 204, std::mem::size_of::<libc::c_int>())
);
ioctl_write_int_bad!(
    tun_set_group,
    request_code_write!(b'T', 206, std::mem::size_of::<libc::c_int>())
);

ioctl_readwrite_bad!(siocgifflags, libc::SIOCGIFFLAGS, Ifreq);
ioctl_write_ptr_bad!(siocsifflags, libc::SIOCSIFFLAGS, Ifreq);
ioctl_readwrite_bad!(siocgifaddr, libc::SIOCGIFADDR, Ifreq);
ioctl_write_ptr_bad!(siocsifaddr, libc::SIOCSIFADDR, Ifreq);
ioctl_readwrite_bad!(siocgifnetmask, libc::SIOCGIFNETMASK, Ifreq);
ioctl_write_ptr_bad!(siocsifnetmask, libc::SIOCSIFNETMASK, Ifreq);
ioctl_readwrite_bad!(siocgifmtu, libc::SIOCGIFMTU, Ifreq);
ioctl_write_ptr_bad!(siocsifmtu, libc::SIOCSIFMTU, Ifreq);
ioctl_readwrite_bad!(siocgifhwaddr, libc::SIOCGIFHWADDR, Ifreq);
ioctl_write_ptr_bad!(siocsifhwaddr, libc::SIOCSIFHWADDR, Ifreq);

#[repr(C)]
#[derive(Clone, Copy)]
union IfreqData {
    flags: libc::c_short,
    int: libc::c_int,
    addr: libc::sockaddr,
    addr_in: libc::sockaddr_in,
    // struct ifmap is the largest member on 64-bit targets
    _pad: [u8; 24],
}

/// `struct ifreq`: interface name followed by a request-specific payload.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct Ifreq {
    name: [libc::c_char; libc::IFNAMSIZ],
    data: IfreqData,
}

impl Ifreq {
    /// Zeroed request addressed to `name`. An empty name is allowed for
    /// `TUNSETIFF`, where it asks the kernel to pick one.
    pub(crate) fn new(name: &str) -> Result<Self> {
        if name.len() >= libc::IFNAMSIZ || name.bytes().any(|b| b == 0) {
            return Err(Error::InvalidName(name.to_string()));
        }
        let mut req = Ifreq {
            name: [0; libc::IFNAMSIZ],
            data: IfreqData { _pad: [0; 24] },
        };
        for (dst, b) in req.name.iter_mut().zip(name.bytes()) {
            *dst = b as libc::c_char;
        }
        Ok(req)
    }

    pub(crate) fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn short(&self) -> libc::c_short {
        unsafe { self.data.flags }
    }

    fn set_short(&mut self, value: libc::c_short) {
        self.data.flags = value;
    }

    fn int(&self) -> libc::c_int {
        unsafe { self.data.int }
    }

    fn set_int(&mut self, value: libc::c_int) {
        self.data.int = value;
    }

    fn inet(&self) -> Ipv4Addr {
        let sin = unsafe { self.data.addr_in };
        Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes())
    }

    fn set_inet(&mut self, ip: Ipv4Addr) {
        self.data.addr_in = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: 0,
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(ip.octets()),
            },
            sin_zero: [0; 8],
        };
    }

    fn hwaddr(&self) -> MacAddr {
        let sa = unsafe { self.data.addr };
        let mut mac = [0u8; 6];
        for (dst, &b) in mac.iter_mut().zip(sa.sa_data.iter()) {
            *dst = b as u8;
        }
        MacAddr(mac)
    }

    fn set_hwaddr(&mut self, mac: MacAddr) {
        let mut sa = unsafe { self.data.addr };
        sa.sa_family = libc::ARPHRD_ETHER as libc::sa_family_t;
        for (dst, &b) in sa.sa_data.iter_mut().zip(mac.0.iter()) {
            *dst = b as libc::c_char;
        }
        self.data.addr = sa;
    }
}

/// Bind the open device node to an interface. Returns the kernel's name for it.
pub(crate) fn set_iff(fd: RawFd, name: &str, flags: DeviceFlags) -> Result<String> {
    let mut req = Ifreq::new(name)?;
    req.set_short(flags.bits() as libc::c_short);
    unsafe { tun_set_iff(fd, &mut req) }.map_err(Error::control("TUNSETIFF"))?;
    Ok(req.name())
}

pub(crate) fn set_owner(fd: RawFd, uid: u32) -> Result<()> {
    unsafe { tun_set_owner(fd, uid as libc::c_int) }.map_err(Error::control("TUNSETOWNER"))?;
    Ok(())
}

pub(crate) fn set_group(fd: RawFd, gid: u32) -> Result<()> {
    unsafe { tun_set_group(fd, gid as libc::c_int) }.map_err(Error::control("TUNSETGROUP"))?;
    Ok(())
}

/// Short-lived `AF_INET` datagram socket used as the target of `SIOC*`
/// requests. Closed when dropped.
pub(crate) struct ControlSocket {
    fd: OwnedFd,
}

impl ControlSocket {
    pub(crate) fn open() -> Result<Self> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(Error::control("socket"))?;
        Ok(Self { fd })
    }

    fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub(crate) fn flags(&self, name: &str) -> Result<InterfaceFlags> {
        let mut req = Ifreq::new(name)?;
        unsafe { siocgifflags(self.raw(), &mut req) }.map_err(Error::control("SIOCGIFFLAGS"))?;
        // go through u16 so the high bit of the short does not sign-extend
        Ok(InterfaceFlags::from_bits_truncate(
            req.short() as u16 as libc::c_int,
        ))
    }

    pub(crate) fn set_flags(&self, name: &str, flags: InterfaceFlags) -> Result<()> {
        let mut req = Ifreq::new(name)?;
        req.set_short(flags.bits() as libc::c_short);
        unsafe { siocsifflags(self.raw(), &req) }.map_err(Error::control("SIOCSIFFLAGS"))?;
        Ok(())
    }

    pub(crate) fn address(&self, name: &str) -> Result<Ipv4Addr> {
        let mut req = Ifreq::new(name)?;
        unsafe { siocgifaddr(self.raw(), &mut req) }.map_err(Error::control("SIOCGIFADDR"))?;
        Ok(req.inet())
    }

    pub(crate) fn set_address(&self, name: &str, ip: Ipv4Addr) -> Result<()> {
        let mut req = Ifreq::new(name)?;
        req.set_inet(ip);
        unsafe { siocsifaddr(self.raw(), &req) }.map_err(Error::control("SIOCSIFADDR"))?;
        Ok(())
    }

    pub(crate) fn netmask(&self, name: &str) -> Result<Ipv4Addr> {
        let mut req = Ifreq::new(name)?;
        unsafe { siocgifnetmask(self.raw(), &mut req) }
            .map_err(Error::control("SIOCGIFNETMASK"))?;
        Ok(req.inet())
    }

    pub(crate) fn set_netmask(&self, name: &str, mask: Ipv4Addr) -> Result<()> {
        let mut req = Ifreq::new(name)?;
        req.set_inet(mask);
        unsafe { siocsifnetmask(self.raw(), &req) }.map_err(Error::control("SIOCSIFNETMASK"))?;
        Ok(())
    }

    pub(crate) fn mtu(&self, name: &str) -> Result<u32> {
        let mut req = Ifreq::new(name)?;
        unsafe { siocgifmtu(self.raw(), &mut req) }.map_err(Error::control("SIOCGIFMTU"))?;
        Ok(req.int() as u32)
    }

    pub(crate) fn set_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let mut req = Ifreq::new(name)?;
        req.set_int(mtu as libc::c_int);
        unsafe { siocsifmtu(self.raw(), &req) }.map_err(Error::control("SIOCSIFMTU"))?;
        Ok(())
    }

    pub(crate) fn hardware_address(&self, name: &str) -> Result<MacAddr> {
        let mut req = Ifreq::new(name)?;
        unsafe { siocgifhwaddr(self.raw(), &mut req) }
            .map_err(Error::control("SIOCGIFHWADDR"))?;
        Ok(req.hwaddr())
    }

    pub(crate) fn set_hardware_address(&self, name: &str, mac: MacAddr) -> Result<()> {
        let mut req = Ifreq::new(name)?;
        req.set_hwaddr(mac);
        unsafe { siocsifhwaddr(self.raw(), &req) }.map_err(Error::control("SIOCSIFHWADDR"))?;
        Ok(())
    }
}
