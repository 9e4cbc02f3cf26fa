mod endpoint;
mod gate;

pub use self::endpoint::{Direction, RelayEndpoint, Session};
pub use self::gate::{GateState, HandshakeGate, DEFAULT_TOKEN};
