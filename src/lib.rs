pub mod cancel;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod mac;
pub mod relay;

#[cfg(test)]
mod test;

pub use cancel::Cancellation;
pub use device::{Device, DeviceFlags, InterfaceConfig, Mode, VirtualInterface};
pub use error::{Error, Result};
pub use mac::MacAddr;
pub use relay::{HandshakeGate, RelayEndpoint, Session};
