use crate::device::Device;
use crate::relay::{RelayEndpoint, Session};
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Admission token expected as the first datagram from a new peer.
pub const DEFAULT_TOKEN: &[u8] = b"hello";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Listening,
    /// Terminal: the binding never changes once made.
    Admitted(SocketAddr),
}

/// Admits exactly one peer: the first sender of a datagram equal to the token.
///
/// Later datagrams are not checked against the token or the peer address;
/// the trust decision is made once.
#[derive(Debug, Clone)]
pub struct HandshakeGate {
    token: Vec<u8>,
    state: GateState,
}

impl HandshakeGate {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
            state: GateState::Listening,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Feed one inbound datagram. Returns the peer if this datagram admitted it.
    pub fn offer(&mut self, datagram: &[u8], from: SocketAddr) -> Option<SocketAddr> {
        match self.state {
            GateState::Admitted(_) => None,
            GateState::Listening if datagram == self.token.as_slice() => {
                self.state = GateState::Admitted(from);
                info!(peer = %from, "peer admitted");
                Some(from)
            }
            GateState::Listening => {
                debug!(%from, len = datagram.len(), "discarding datagram, not the admission token");
                None
            }
        }
    }

    /// Receive on `socket` until a peer is admitted.
    pub async fn admit(&mut self, socket: &UdpSocket) -> Result<SocketAddr> {
        if let GateState::Admitted(peer) = self.state {
            return Ok(peer);
        }
        // one spare byte so a longer datagram cannot truncate into a match
        let mut buf = vec![0u8; self.token.len() + 1];
        loop {
            let (n, from) = socket.recv_from(&mut buf).await?;
            if let Some(peer) = self.offer(&buf[..n], from) {
                return Ok(peer);
            }
        }
    }

    /// Admit a peer, then start relaying frames between it and `device`.
    pub async fn open<D: Device>(
        mut self,
        device: Arc<D>,
        socket: Arc<UdpSocket>,
        capacity: usize,
    ) -> Result<Session> {
        let peer = self.admit(&socket).await?;
        Ok(RelayEndpoint::new(device, socket, peer)
            .with_capacity(capacity)
            .spawn())
    }
}

impl Default for HandshakeGate {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN)
    }
}
