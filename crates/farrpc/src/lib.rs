//! Transport-agnostic remote function calls over ordered message streams.
//!
//! One endpoint invokes nested methods on the other endpoint's provider
//! object as if the provider were local: natural return values come back,
//! thrown faults come back with their identity intact, and many concurrent
//! calls multiplex over a single connection, correlated by id. Concrete
//! transports plug in through the adapter contract in [`transport`].

pub mod acceptor;
pub mod communicator;
pub mod driver;
pub mod duplex;
pub mod error;
pub mod invoke;
pub mod provider;
pub mod transport;

#[cfg(test)]
mod tests;

pub use crate::acceptor::Lifecycle;
pub use crate::acceptor::State;

pub use crate::communicator::Communicator;

pub use crate::driver::Driver;

pub use crate::error::CallError;
pub use crate::error::CallResult;
pub use crate::error::Fault;
pub use crate::error::StateError;

pub use crate::invoke::ErrorValue;
pub use crate::invoke::FunctionInvoke;
pub use crate::invoke::Invoke;
pub use crate::invoke::Parameter;
pub use crate::invoke::ReturnInvoke;

pub use crate::provider::Member;
pub use crate::provider::Method;
pub use crate::provider::Provider;

pub use crate::transport::Transport;
