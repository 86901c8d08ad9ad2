//! # Driver
//!
//! The client-side façade over a remote provider. A driver is nothing but
//! a member path and a weak back-reference to its communicator: extending
//! the path produces a new driver and costs no wire traffic; only an
//! invocation materializes a function record.
//!
//! The weak reference breaks the ownership cycle driver -> communicator ->
//! pending completion -> caller continuation -> driver; a driver that
//! outlives its communicator fails calls with a shutdown error instead of
//! keeping the engine alive.
//!
//! A driver is deliberately not a future and does not implement any
//! completion protocol: only the value returned by [`Driver::call`] can be
//! awaited, so member access can never trigger an accidental invocation.

use std::sync::Weak;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::communicator::Communicator;
use crate::error::CallError;
use crate::error::CallResult;
use crate::invoke::Parameter;

/// Path-building call façade over a remote provider.
#[derive(Debug, Clone)]
pub struct Driver {
    communicator: Weak<Communicator>,
    path: String,
}

impl Driver {
    pub(crate) fn root(communicator: Weak<Communicator>) -> Self {
        Self {
            communicator,
            path: String::new(),
        }
    }

    /// The accumulated dot-separated member path; empty at the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Extends the member path by one segment. No wire traffic.
    pub fn member(&self, name: &str) -> Driver {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        };
        Driver {
            communicator: self.communicator.clone(),
            path,
        }
    }

    /// Invokes the member at the current path.
    ///
    /// `Args` is serialized positionally: tuples become the parameter
    /// list, `()` sends no parameters, and a single non-sequence value is
    /// sent as one parameter. The returned future suspends until the
    /// matching return arrives and decodes it into `Ret`.
    pub async fn call<Args, Ret>(&self, args: Args) -> CallResult<Ret>
    where
        Args: Serialize,
        Ret: DeserializeOwned,
    {
        let parameters = encode_args(args)?;
        let value = self.call_with(parameters).await?;
        serde_json::from_value(value).map_err(|e| CallError::Codec(format!("return value: {}", e)))
    }

    /// Invokes with explicit wire parameters and yields the raw value.
    pub async fn call_with(&self, parameters: Vec<Parameter>) -> CallResult<Value> {
        if self.path.is_empty() {
            return Err(CallError::Codec(
                "the driver root is not callable; select a member first".into(),
            ));
        }
        let communicator = self
            .communicator
            .upgrade()
            .ok_or(CallError::Shutdown(None))?;
        communicator.send_invoke(self.path.clone(), parameters).await
    }
}

fn encode_args<Args: Serialize>(args: Args) -> CallResult<Vec<Parameter>> {
    let value =
        serde_json::to_value(args).map_err(|e| CallError::Codec(format!("arguments: {}", e)))?;
    Ok(match value {
        Value::Array(items) => items.into_iter().map(Parameter::Plain).collect(),
        Value::Null => Vec::new(),
        single => vec![Parameter::Plain(single)],
    })
}
