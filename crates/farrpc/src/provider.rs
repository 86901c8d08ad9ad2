//! # Provider Objects
//!
//! The provider is the object a communicator exposes for remote invocation:
//! a tree of named members, where each member is either a nested object or
//! a callable method. Incoming calls carry a dot-separated path that is
//! resolved against this tree, and a path that does not end in a callable
//! fails with a resolution fault on the *remote* side, preserving as-if
//! local semantics for the caller.
//!
//! Methods are registered through a typed builder: arguments decode from
//! the wire parameters into any `DeserializeOwned` tuple, and the return
//! value encodes from any `Serialize` type. The erased form boxes the
//! future, since provider methods may suspend.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Fault;
use crate::invoke::Parameter;

/// A callable leaf of a provider tree.
///
/// Implementations receive the raw wire parameters and settle with either a
/// return value or a fault whose descriptor is transmitted verbatim.
pub trait Method: Send + Sync {
    fn call(&self, parameters: Vec<Parameter>) -> BoxFuture<'static, Result<Value, Fault>>;
}

impl std::fmt::Debug for dyn Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Method")
    }
}

/// A named member of a provider: nested object or callable.
#[derive(Clone)]
pub enum Member {
    Object(Provider),
    Method(Arc<dyn Method>),
}

/// Tree of members resolvable by dot-separated paths.
#[derive(Clone, Default)]
pub struct Provider {
    members: BTreeMap<String, Member>,
}

impl Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a nested object member.
    pub fn object(mut self, name: impl Into<String>, child: Provider) -> Self {
        self.members.insert(name.into(), Member::Object(child));
        self
    }

    /// Registers a typed method.
    ///
    /// `Args` is the argument tuple (`()`, `(f64,)`, `(f64, f64)`, ...);
    /// the wire parameter list decodes into it positionally. The closure's
    /// future settles with `Ok(return value)` or `Err(fault)`.
    pub fn method<Args, Ret, Fut, F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Ret: Serialize + Send + 'static,
        Fut: Future<Output = Result<Ret, Fault>> + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
    {
        // Erase the argument and future types here, so the tree stores one
        // uniform callable shape.
        let erased = move |parameters: Vec<Parameter>| -> BoxFuture<'static, Result<Value, Fault>> {
            match decode_args::<Args>(parameters) {
                Ok(args) => {
                    let future = function(args);
                    Box::pin(async move {
                        let ret = future.await?;
                        serde_json::to_value(ret).map_err(|e| {
                            Fault::new("SerializationError", format!("return value: {}", e))
                        })
                    })
                }
                Err(fault) => Box::pin(async move { Err(fault) }),
            }
        };
        self.members
            .insert(name.into(), Member::Method(Arc::new(FnMethod(erased))));
        self
    }

    /// Registers an already-erased method.
    pub fn raw_method(mut self, name: impl Into<String>, method: Arc<dyn Method>) -> Self {
        self.members.insert(name.into(), Member::Method(method));
        self
    }

    /// Resolves a dot-separated member path to its callable.
    ///
    /// Walks the segments in order; a missing segment, a method in an
    /// intermediate position, or an object in the final position all fail
    /// with a resolution fault.
    pub fn resolve(&self, listener: &str) -> Result<Arc<dyn Method>, Fault> {
        if listener.is_empty() {
            return Err(Fault::resolution("empty member path"));
        }
        let mut current = self;
        let mut segments = listener.split('.').peekable();
        while let Some(segment) = segments.next() {
            let member = current.members.get(segment).ok_or_else(|| {
                Fault::resolution(format!("unknown member '{}' in path '{}'", segment, listener))
            })?;
            match member {
                Member::Object(child) => {
                    if segments.peek().is_none() {
                        return Err(Fault::resolution(format!(
                            "'{}' is not a function",
                            listener
                        )));
                    }
                    current = child;
                }
                Member::Method(method) => {
                    if segments.peek().is_some() {
                        return Err(Fault::resolution(format!(
                            "'{}' in path '{}' is a function, not an object",
                            segment, listener
                        )));
                    }
                    return Ok(Arc::clone(method));
                }
            }
        }
        // Split always yields at least one segment on a non-empty path.
        Err(Fault::resolution(format!(
            "'{}' did not resolve to a function",
            listener
        )))
    }
}

struct FnMethod<F>(F);

impl<F> Method for FnMethod<F>
where
    F: Fn(Vec<Parameter>) -> BoxFuture<'static, Result<Value, Fault>> + Send + Sync,
{
    fn call(&self, parameters: Vec<Parameter>) -> BoxFuture<'static, Result<Value, Fault>> {
        (self.0)(parameters)
    }
}

/// Decodes wire parameters into a positional argument tuple.
///
/// An empty parameter list decodes as JSON null so zero-argument methods
/// can take `Args = ()`.
fn decode_args<Args: DeserializeOwned>(parameters: Vec<Parameter>) -> Result<Args, Fault> {
    let value = if parameters.is_empty() {
        Value::Null
    } else {
        Value::Array(parameters.into_iter().map(Parameter::into_value).collect())
    };
    serde_json::from_value(value)
        .map_err(|e| Fault::new("ArgumentError", format!("argument mismatch: {}", e)))
}
