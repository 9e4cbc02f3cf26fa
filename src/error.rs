//! Error types for tapwire.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::device::DeviceFlags;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The device node is missing, or the requested name is held by someone else.
    #[error("virtual device {} unavailable: {source}", .path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied: {source}")]
    PermissionDenied {
        #[source]
        source: io::Error,
    },

    /// The kernel refused the flag mask handed to the set-interface request.
    #[error("kernel rejected flag combination {flags}: {source}")]
    InvalidFlagCombination {
        flags: DeviceFlags,
        #[source]
        source: io::Error,
    },

    #[error("invalid interface name {0:?}")]
    InvalidName(String),

    /// A control request was rejected; the errno is passed through untouched.
    #[error("{request} failed: {source}")]
    Control {
        request: &'static str,
        #[source]
        source: nix::Error,
    },

    /// The device must be registered with a reactor; build it inside a Tokio runtime.
    #[error("no Tokio runtime available to drive the device")]
    NoRuntime,

    #[error("hardware address requires a link-layer (TAP) interface")]
    NotLinkLayer,

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("interface closed")]
    Closed,

    #[error("relay task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Errors raised while building the interface; these abort startup.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnavailable { .. }
                | Error::PermissionDenied { .. }
                | Error::InvalidFlagCombination { .. }
                | Error::InvalidName(_)
                | Error::NoRuntime
        )
    }

    pub(crate) fn control(request: &'static str) -> impl FnOnce(nix::Error) -> Error {
        move |source| Error::Control { request, source }
    }
}
