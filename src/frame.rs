//! Frame sizing and log-friendly frame descriptions.
//!
//! Frames are opaque to the relay; nothing here is on the forwarding path
//! except [`capacity`].

use crate::device::Mode;
use crate::MacAddr;
use etherparse::{LinkSlice, NetSlice, SlicedPacket, TransportSlice};
use std::fmt::Write;

/// Ethernet II header: two MAC addresses and the ethertype.
pub const ETHERNET_OVERHEAD: usize = 14;

/// Relay buffer size for the default configuration: the largest UDP
/// payload that fits a 1500-byte path without fragmentation.
pub const DEFAULT_FRAME_CAPACITY: usize = 1472;

/// Interface MTU that makes a full TAP frame exactly fill [`DEFAULT_FRAME_CAPACITY`].
pub const DEFAULT_MTU: u32 = (DEFAULT_FRAME_CAPACITY - ETHERNET_OVERHEAD) as u32;

/// Buffer length needed to carry one frame of an interface with this MTU.
pub fn capacity(mtu: u32, mode: Mode) -> usize {
    match mode {
        Mode::Tun => mtu as usize,
        Mode::Tap => mtu as usize + ETHERNET_OVERHEAD,
    }
}

/// One-line description of a frame for trace logging.
pub fn summary(frame: &[u8], mode: Mode) -> String {
    let sliced = match mode {
        Mode::Tap => SlicedPacket::from_ethernet(frame),
        Mode::Tun => SlicedPacket::from_ip(frame),
    };
    let packet = match sliced {
        Ok(p) => p,
        Err(_) => return format!("opaque {} bytes", frame.len()),
    };

    let mut out = String::new();
    if let Some(LinkSlice::Ethernet2(eth)) = &packet.link {
        let _ = write!(
            out,
            "{} > {} ",
            MacAddr(eth.source()),
            MacAddr(eth.destination())
        );
    }

    let ports = match &packet.transport {
        Some(TransportSlice::Udp(udp)) => Some(("udp", udp.source_port(), udp.destination_port())),
        Some(TransportSlice::Tcp(tcp)) => Some(("tcp", tcp.source_port(), tcp.destination_port())),
        _ => None,
    };

    match (&packet.net, ports) {
        (Some(NetSlice::Ipv4(ip)), Some((proto, sp, dp))) => {
            let h = ip.header();
            let _ = write!(out, "{}:{} > {}:{} {}", h.source_addr(), sp, h.destination_addr(), dp, proto);
        }
        (Some(NetSlice::Ipv4(ip)), None) => {
            let h = ip.header();
            let _ = write!(out, "{} > {} proto={}", h.source_addr(), h.destination_addr(), h.protocol().0);
        }
        (Some(NetSlice::Ipv6(ip)), Some((proto, sp, dp))) => {
            let h = ip.header();
            let _ = write!(out, "[{}]:{} > [{}]:{} {}", h.source_addr(), sp, h.destination_addr(), dp, proto);
        }
        (Some(NetSlice::Ipv6(ip)), None) => {
            let h = ip.header();
            let _ = write!(out, "{} > {}", h.source_addr(), h.destination_addr());
        }
        _ => {
            let _ = write!(out, "non-ip");
        }
    }
    let _ = write!(out, " ({} bytes)", frame.len());
    out
}
