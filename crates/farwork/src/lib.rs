//! Worker transport for the farrpc engine: a parent process drives a
//! child over piped stdio, with a `READY` round trip before the first
//! record and a cooperative `CLOSE` at the end.
//!
//! Both halves are generic over the byte streams they run on, so the same
//! protocol works over real child-process stdio and over in-memory pipes.

mod channel;
mod connector;
mod link;

pub use crate::channel::WorkerChannel;
pub use crate::connector::WorkerConnector;

use farrpc::error::StateError;

/// Worker connection establishment failures.
#[derive(Debug, Clone)]
pub enum Error {
    Spawn(String),
    Handshake(String),
    State(StateError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "spawn failed: {}", msg),
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
