use crate::cancel::Cancellation;
use crate::device::Device;
use crate::frame::{self, DEFAULT_FRAME_CAPACITY};
use crate::{Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, enabled, info, trace, warn, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// device -> peer
    Egress,
    /// peer -> device
    Ingress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Egress => write!(f, "egress"),
            Direction::Ingress => write!(f, "ingress"),
        }
    }
}

/// Pairs one device with one UDP peer and pumps frames both ways.
pub struct RelayEndpoint<D: Device> {
    device: Arc<D>,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    capacity: usize,
}

impl<D: Device> RelayEndpoint<D> {
    pub fn new(device: Arc<D>, socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            device,
            socket,
            peer,
            capacity: DEFAULT_FRAME_CAPACITY,
        }
    }

    /// Size of each pump's frame buffer. Datagrams and frames longer than
    /// this are truncated by the kernel.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Start both pumps on the current runtime.
    pub fn spawn(self) -> Session {
        let cancel = Cancellation::new();
        info!(peer = %self.peer, capacity = self.capacity, "relay session started");

        let egress = tokio::spawn(egress(
            self.device.clone(),
            self.socket.clone(),
            self.peer,
            self.capacity,
            cancel.clone(),
        ));
        let ingress = tokio::spawn(ingress(
            self.device,
            self.socket,
            self.peer,
            self.capacity,
            cancel.clone(),
        ));

        Session {
            peer: self.peer,
            cancel,
            egress,
            ingress,
        }
    }
}

/// A running pair of pumps bound to one peer.
///
/// The session ends as soon as either pump hits an error; the other one is
/// cancelled through the shared signal. The device and socket stay open.
pub struct Session {
    peer: SocketAddr,
    cancel: Cancellation,
    egress: JoinHandle<Result<()>>,
    ingress: JoinHandle<Result<()>>,
}

impl Session {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Wait for both pumps to stop. Returns the error that ended the session.
    pub async fn wait(self) -> Result<()> {
        let (egress, ingress) = tokio::join!(self.egress, self.ingress);
        let result = match (egress, ingress) {
            (Err(e), _) | (_, Err(e)) => Err(Error::Task(e)),
            (Ok(Err(e)), _) | (_, Ok(Err(e))) => Err(e),
            (Ok(Ok(())), Ok(Ok(()))) => Ok(()),
        };
        match &result {
            Ok(()) => info!(peer = %self.peer, "relay session ended"),
            Err(e) => warn!(peer = %self.peer, error = %e, "relay session failed"),
        }
        result
    }
}

/// Sets the signal however the owning pump exits, unwinding included.
struct CancelOnDrop(Cancellation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn egress<D: Device>(
    device: Arc<D>,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    capacity: usize,
    cancel: Cancellation,
) -> Result<()> {
    let _guard = CancelOnDrop(cancel.clone());
    let mut buf = vec![0u8; capacity];
    debug!(%peer, "egress pump running");

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = device.recv(&mut buf) => pump_error(Direction::Egress, res)?,
        };
        log_frame(Direction::Egress, &buf[..n], device.as_ref());

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = socket.send_to(&buf[..n], peer) => pump_error(Direction::Egress, res.map_err(Error::from))?,
        };
        if sent != n {
            return pump_error(Direction::Egress, Err(Error::ShortWrite { written: sent, expected: n }));
        }
    }
}

async fn ingress<D: Device>(
    device: Arc<D>,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    capacity: usize,
    cancel: Cancellation,
) -> Result<()> {
    let _guard = CancelOnDrop(cancel.clone());
    let mut buf = vec![0u8; capacity];
    debug!(%peer, "ingress pump running");

    loop {
        let (n, from) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = socket.recv_from(&mut buf) => pump_error(Direction::Ingress, res.map_err(Error::from))?,
        };
        // a datagram never carries an empty frame
        if n == 0 {
            continue;
        }
        if from != peer {
            // senders are not verified after admission
            trace!(%peer, %from, "datagram from unexpected source");
        }
        log_frame(Direction::Ingress, &buf[..n], device.as_ref());

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = device.send(&buf[..n]) => pump_error(Direction::Ingress, res)?,
        };
        if written != n {
            return pump_error(Direction::Ingress, Err(Error::ShortWrite { written, expected: n }));
        }
    }
}

fn pump_error<T>(direction: Direction, res: Result<T>) -> Result<T> {
    if let Err(e) = &res {
        debug!(%direction, error = %e, "pump stopped");
    }
    res
}

fn log_frame<D: Device>(direction: Direction, frame: &[u8], device: &D) {
    if enabled!(Level::TRACE) {
        trace!(%direction, "{}", frame::summary(frame, device.mode()));
    }
}
