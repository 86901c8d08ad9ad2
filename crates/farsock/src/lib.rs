//! WebSocket transport for the farrpc engine.
//!
//! Text frames carry one JSON-encoded record each; close codes are
//! surfaced to the engine's drain, and the HTTP upgrade path is exposed so
//! a single server can select providers per path.

mod connector;
mod link;
mod server;

pub use crate::connector::WsConnector;
pub use crate::server::WsAcceptor;
pub use crate::server::WsServer;

use farrpc::error::StateError;

/// Close codes treated as a clean shutdown (normal closure and going
/// away). Every other code fails the pending calls with a transport
/// fault.
pub const CLEAN_CLOSE_CODES: [u16; 2] = [1000, 1001];

/// Connection establishment failures.
#[derive(Debug, Clone)]
pub enum Error {
    Io(String),
    Handshake(String),
    State(StateError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "i/o error: {}", msg),
            Self::Handshake(msg) => write!(f, "handshake failed: {}", msg),
            Self::State(e) => write!(f, "state error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<StateError> for Error {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}
