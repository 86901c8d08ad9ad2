//! # Failure Taxonomy
//!
//! Local lifecycle mistakes ([`StateError`]) are raised synchronously and
//! never cross the wire. Provider throws travel as a [`Fault`] descriptor
//! and are reconstructed on the caller. [`CallError`] is the union a
//! suspended caller can observe.

use serde_json::Value;

use crate::acceptor::State;
use crate::invoke::ErrorValue;
use crate::transport;

/// Fault name produced when a function invoke arrives with no provider attached.
pub const NO_PROVIDER_ERROR: &str = "NoProviderError";

/// Fault name produced when a member path does not lead to a callable.
pub const RESOLUTION_ERROR: &str = "ResolutionError";

/// An operation was attempted in a lifecycle state that forbids it.
///
/// These are caller programming bugs; they are raised locally and never
/// serialized into a return record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The connection has not reached `Open` yet.
    NotOpened(State),
    /// The connection is already fully closed.
    AlreadyClosed,
    /// A close is already in progress.
    ClosingInProgress,
    /// A transition outside the permitted lifecycle graph.
    IllegalTransition { from: State, to: State },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOpened(state) => write!(f, "connection not opened yet (state {:?})", state),
            Self::AlreadyClosed => write!(f, "connection already closed"),
            Self::ClosingInProgress => write!(f, "connection close in progress"),
            Self::IllegalTransition { from, to } => {
                write!(f, "illegal lifecycle transition {:?} -> {:?}", from, to)
            }
        }
    }
}

impl std::error::Error for StateError {}

/// An error descriptor with preserved identity.
///
/// Provider methods fail with a `Fault`; the descriptor crosses the wire as
/// an [`ErrorValue`] and is rebuilt verbatim on the calling side, so `name`,
/// `message`, and `stack` survive the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl Fault {
    /// A fault with a synthesized single-line stack.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let stack = format!("{}: {}", name, message);
        Self {
            name,
            message,
            stack,
        }
    }

    /// A fault carrying an explicit stack string.
    pub fn with_stack(
        name: impl Into<String>,
        message: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// The fault sent when no provider is attached.
    pub fn no_provider() -> Self {
        Self::new(NO_PROVIDER_ERROR, "no provider attached to this communicator")
    }

    /// A member-path resolution fault.
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(RESOLUTION_ERROR, message)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for Fault {}

/// What a suspended caller observes when an invocation fails.
#[derive(Debug, Clone)]
pub enum CallError {
    /// Readiness check failed; the call never left this endpoint.
    State(StateError),
    /// The transport refused or lost the record.
    Transport(transport::Error),
    /// Local argument or result encoding failed.
    Codec(String),
    /// The remote side had no provider to resolve against.
    NoProvider(Fault),
    /// The member path did not lead to a callable on the remote provider.
    Resolution(Fault),
    /// The remote provider method threw; identity preserved.
    Remote(Fault),
    /// The communicator shut down while the call was pending. Carries the
    /// close error when the shutdown was not clean.
    Shutdown(Option<Fault>),
}

impl CallError {
    /// Rebuilds a caller-side error from the `value` of a failure return.
    ///
    /// Recognized fault names become their tagged variant; everything else
    /// (including payloads that are not an error descriptor at all)
    /// surfaces as a generic remote error carrying the original message.
    pub fn from_wire(value: Value) -> Self {
        let fault = match serde_json::from_value::<ErrorValue>(value.clone()) {
            Ok(descriptor) => Fault::from(descriptor),
            Err(_) => Fault::new("RemoteError", value.to_string()),
        };
        match fault.name.as_str() {
            NO_PROVIDER_ERROR => Self::NoProvider(fault),
            RESOLUTION_ERROR => Self::Resolution(fault),
            _ => Self::Remote(fault),
        }
    }

    /// The preserved remote descriptor, when one exists.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::NoProvider(fault) | Self::Resolution(fault) | Self::Remote(fault) => Some(fault),
            Self::Shutdown(fault) => fault.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::State(e) => write!(f, "state error: {}", e),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Codec(msg) => write!(f, "codec error: {}", msg),
            Self::NoProvider(fault) => write!(f, "no remote provider: {}", fault),
            Self::Resolution(fault) => write!(f, "resolution failed: {}", fault),
            Self::Remote(fault) => write!(f, "remote error: {}", fault),
            Self::Shutdown(Some(fault)) => write!(f, "communicator closed: {}", fault),
            Self::Shutdown(None) => write!(f, "communicator closed"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::State(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StateError> for CallError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

impl From<transport::Error> for CallError {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

/// A specialized Result for invocation outcomes.
pub type CallResult<T> = std::result::Result<T, CallError>;
