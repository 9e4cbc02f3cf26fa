// A Unix datagram socketpair keeps message boundaries the way a TUN/TAP
// descriptor does, so read/write/close semantics can be exercised without
// CAP_NET_ADMIN. Tests against the real device are #[ignore]d; run them as
// root with `cargo test -- --ignored`.

use crate::device::{DeviceFlags, InterfaceConfig, VirtualInterface};
use crate::{Error, MacAddr};
use nix::net::if_::InterfaceFlags;
use std::fs::File;
use std::net::Ipv4Addr;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn paired(flags: DeviceFlags) -> (VirtualInterface, UnixDatagram) {
    let (ours, theirs) = std::os::unix::net::UnixDatagram::pair().unwrap();
    ours.set_nonblocking(true).unwrap();
    theirs.set_nonblocking(true).unwrap();
    let file = File::from(OwnedFd::from(ours));
    let iface = VirtualInterface::from_file(file, "pair0".into(), flags).unwrap();
    (iface, UnixDatagram::from_std(theirs).unwrap())
}

#[tokio::test]
async fn test_read_returns_one_frame_per_call() {
    let (iface, kernel) = paired(DeviceFlags::TAP | DeviceFlags::NO_PI);

    kernel.send(&[1u8; 10]).await.unwrap();
    kernel.send(&[2u8; 20]).await.unwrap();

    let mut buf = [0u8; 1500];
    let n = iface.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &[1u8; 10]);
    let n = iface.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &[2u8; 20]);
}

#[tokio::test]
async fn test_write_submits_whole_frame() {
    let (iface, kernel) = paired(DeviceFlags::TAP | DeviceFlags::NO_PI);

    let frame = super::frames::FrameFactory::sized(64);
    assert_eq!(iface.write(&frame).await.unwrap(), 64);

    let mut buf = [0u8; 1500];
    let n = kernel.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &frame[..]);
}

#[tokio::test]
async fn test_concurrent_read_and_write_do_not_interleave() {
    let (iface, kernel) = paired(DeviceFlags::TAP | DeviceFlags::NO_PI);
    let iface = Arc::new(iface);
    let kernel = Arc::new(kernel);
    const FRAMES: u8 = 100;

    let reader = tokio::spawn({
        let iface = iface.clone();
        async move {
            let mut buf = [0u8; 1500];
            for i in 0..FRAMES {
                let n = iface.read(&mut buf).await.unwrap();
                assert_eq!(n, 100);
                assert!(buf[..n].iter().all(|&b| b == i), "frame {i} corrupted");
            }
        }
    });
    let writer = tokio::spawn({
        let iface = iface.clone();
        async move {
            for _ in 0..FRAMES {
                assert_eq!(iface.write(&[0xaa; 200]).await.unwrap(), 200);
            }
        }
    });
    let feeder = tokio::spawn({
        let kernel = kernel.clone();
        async move {
            for i in 0..FRAMES {
                kernel.send(&[i; 100]).await.unwrap();
            }
        }
    });

    let mut buf = [0u8; 1500];
    for _ in 0..FRAMES {
        let n = timeout(WAIT, kernel.recv(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 200);
        assert!(buf[..n].iter().all(|&b| b == 0xaa));
    }

    timeout(WAIT, reader).await.unwrap().unwrap();
    timeout(WAIT, writer).await.unwrap().unwrap();
    timeout(WAIT, feeder).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_close_wakes_pending_read() {
    let (iface, _kernel) = paired(DeviceFlags::TAP | DeviceFlags::NO_PI);
    let iface = Arc::new(iface);

    let reader = tokio::spawn({
        let iface = iface.clone();
        async move {
            let mut buf = [0u8; 1500];
            iface.read(&mut buf).await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    iface.close().unwrap();
    let res = timeout(WAIT, reader).await.expect("read must not hang").unwrap();
    assert!(matches!(res, Err(Error::Closed)), "{res:?}");
}

#[tokio::test]
async fn test_everything_fails_after_close() {
    let (iface, _kernel) = paired(DeviceFlags::TAP | DeviceFlags::NO_PI);
    assert!(iface.last_flags().is_empty(), "nothing read or written yet");
    iface.close().unwrap();
    assert!(iface.is_closed());

    let mut buf = [0u8; 64];
    assert!(matches!(iface.read(&mut buf).await, Err(Error::Closed)));
    assert!(matches!(iface.write(&buf).await, Err(Error::Closed)));
    assert!(matches!(iface.up(), Err(Error::Closed)));
    assert!(matches!(iface.down(), Err(Error::Closed)));
    assert!(matches!(
        iface.set_address(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0)),
        Err(Error::Closed)
    ));
    assert!(matches!(iface.set_mtu(1400), Err(Error::Closed)));
    assert!(matches!(
        iface.set_hardware_address(MacAddr::random_local()),
        Err(Error::Closed)
    ));
    assert!(matches!(iface.flags(), Err(Error::Closed)));
    assert!(matches!(iface.close(), Err(Error::Closed)), "released exactly once");
}

#[tokio::test]
async fn test_closed_tun_reports_closed_before_mode() {
    let (iface, _kernel) = paired(DeviceFlags::TUN | DeviceFlags::NO_PI);
    iface.close().unwrap();

    assert!(matches!(
        iface.set_hardware_address(MacAddr::random_local()),
        Err(Error::Closed)
    ));
    assert!(matches!(iface.hardware_address(), Err(Error::Closed)));
}

#[tokio::test]
async fn test_hardware_address_needs_tap() {
    let (iface, _kernel) = paired(DeviceFlags::TUN | DeviceFlags::NO_PI);
    assert_eq!(iface.device_flags(), DeviceFlags::TUN | DeviceFlags::NO_PI);
    assert!(matches!(
        iface.set_hardware_address(MacAddr::random_local()),
        Err(Error::NotLinkLayer)
    ));
    assert!(matches!(iface.hardware_address(), Err(Error::NotLinkLayer)));
}

#[tokio::test]
#[ignore = "needs CAP_NET_ADMIN and /dev/net/tun"]
async fn test_tap_lifecycle() {
    let iface = InterfaceConfig::new()
        .tap()
        .no_packet_info()
        .name("")
        .build()
        .unwrap();
    assert!(iface.name().starts_with("tap"), "kernel-assigned name {}", iface.name());

    let ip = Ipv4Addr::new(10, 0, 0, 1);
    let mask = Ipv4Addr::new(255, 255, 255, 0);
    iface.set_address(ip, mask).unwrap();
    assert_eq!(iface.address().unwrap(), ip);
    assert_eq!(iface.netmask().unwrap(), mask);

    iface.up().unwrap();
    assert!(iface.last_flags().contains(InterfaceFlags::IFF_UP));
    assert!(iface.is_up().unwrap());
    assert_eq!(iface.last_flags(), iface.flags().unwrap());
    iface.down().unwrap();
    assert!(!iface.last_flags().contains(InterfaceFlags::IFF_UP));
    assert!(!iface.is_up().unwrap());
    assert_eq!(iface.last_flags(), iface.flags().unwrap());
    iface.up().unwrap();
    assert!(iface.is_up().unwrap());

    iface.set_mtu(1400).unwrap();
    assert_eq!(iface.mtu().unwrap(), 1400);

    let mac = MacAddr::random_local();
    iface.down().unwrap();
    iface.set_hardware_address(mac).unwrap();
    assert_eq!(iface.hardware_address().unwrap(), mac);

    iface.close().unwrap();
    assert!(matches!(iface.up(), Err(Error::Closed)));
}

#[tokio::test]
#[ignore = "needs CAP_NET_ADMIN and /dev/net/tun"]
async fn test_kernel_rejects_missing_mode() {
    let err = InterfaceConfig::new().no_packet_info().build().unwrap_err();
    assert!(matches!(err, Error::InvalidFlagCombination { .. }), "{err:?}");
}
