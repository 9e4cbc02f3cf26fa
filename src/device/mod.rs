mod config;
mod ioctl;
mod tun;

// Import and re-export
pub use self::config::{DeviceFlags, InterfaceConfig, Mode, DEFAULT_DEVICE_PATH};
pub use self::tun::VirtualInterface;

// Mock device for testing
#[cfg(test)]
pub mod mock;
#[cfg(test)]
pub use self::mock::MockDevice;

use crate::Result;
use std::future::Future;

/// A source and sink of raw frames.
///
/// One task may be inside `recv` while another is inside `send` on the same
/// device.
pub trait Device: Send + Sync + 'static {
    /// Receive exactly one frame into `buf`, waiting until one is available.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Submit one frame. Returns how many bytes the device accepted.
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Layer the frames belong to.
    fn mode(&self) -> Mode;
}
