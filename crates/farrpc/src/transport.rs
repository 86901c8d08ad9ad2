//! # Transport Adapter Contract
//!
//! Every transport binds into a communicator by handing it a [`Transport`]
//! implementation for the outbound direction, and by wiring its own inbound
//! pump to [`Communicator::deliver`] and its close event to
//! [`Communicator::shutdown`]. Inbound payloads that fail to decode are the
//! transport's to drop; they never reach the communicator.
//!
//! [`Communicator::deliver`]: crate::communicator::Communicator::deliver
//! [`Communicator::shutdown`]: crate::communicator::Communicator::shutdown

use crate::error::StateError;
use crate::invoke::Invoke;

/// Control payload announcing that a peer's message pump is attached.
/// Receiving it obliges the receiver to echo it back.
pub const READY: &str = "READY";

/// Control payload requesting a cooperative close on the receiving side.
pub const CLOSE: &str = "CLOSE";

/// A raw inbound payload, classified before any JSON decoding.
///
/// Control messages are bare strings rather than JSON so transports can
/// intercept them without attempting a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Ready,
    Close,
    Data(&'a str),
}

/// Classifies one raw text payload.
pub fn classify(raw: &str) -> Inbound<'_> {
    match raw {
        READY => Inbound::Ready,
        CLOSE => Inbound::Close,
        _ => Inbound::Data(raw),
    }
}

/// Failures at the network or port level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The peer closed with a non-clean code.
    AbnormalClose { code: u16, reason: String },
    /// Connection establishment or handshake failed.
    Handshake(String),
    /// Generic I/O error inside the transport.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::AbnormalClose { code, reason } => {
                write!(f, "abnormal close (code {}): {}", code, reason)
            }
            Self::Handshake(msg) => write!(f, "handshake failed: {}", msg),
            Self::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// The outbound half of a transport, as seen by a communicator.
///
/// Object-safe so communicators hold an `Arc<dyn Transport>`.
pub trait Transport: Send + Sync + 'static {
    /// Readiness gate consulted before every outbound operation.
    ///
    /// Transports with a lifecycle delegate to [`Lifecycle::inspect`];
    /// transports without one (the in-process duplex) answer ready
    /// unconditionally.
    ///
    /// [`Lifecycle::inspect`]: crate::acceptor::Lifecycle::inspect
    fn inspect(&self) -> std::result::Result<(), StateError>;

    /// Hands one record to the transport for delivery.
    ///
    /// # Invariants
    /// - Must not block on network I/O; any buffering is the transport's
    ///   concern.
    /// - Returns `Err` only when the record will never be delivered.
    fn send(&self, invoke: &Invoke) -> Result<()>;
}
