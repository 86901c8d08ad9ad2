//! # Communicator
//!
//! The per-connection engine: it owns the pending-call registry, resolves
//! inbound calls against the local provider, and routes inbound returns to
//! the suspension that is waiting on them. One communicator serves both
//! directions of a connection; transports feed it through
//! [`Communicator::deliver`] and tear it down through
//! [`Communicator::shutdown`].
//!
//! ## Invariants
//! - Correlation ids are strictly increasing from 0 for the lifetime of
//!   the instance; allocation is a single atomic read-modify-write.
//! - Every outbound call holds exactly one pending entry; every matching
//!   return removes it exactly once. Returns with no matching entry are
//!   dropped without touching any state.
//! - After [`Communicator::shutdown`] resolves, the pending table is empty
//!   and stays empty: late sends complete immediately with a shutdown
//!   error instead of registering.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::driver::Driver;
use crate::error::CallError;
use crate::error::CallResult;
use crate::error::Fault;
use crate::invoke::FunctionInvoke;
use crate::invoke::Invoke;
use crate::invoke::Parameter;
use crate::invoke::ReturnInvoke;
use crate::provider::Provider;
use crate::transport::Transport;

type Completion = oneshot::Sender<CallResult<Value>>;

/// Bidirectional invocation engine for one connection.
pub struct Communicator {
    transport: Arc<dyn Transport>,
    provider: Mutex<Option<Provider>>,
    pending: DashMap<u32, Completion>,
    uid: AtomicU32,
    closed: AtomicBool,
    weak_self: Weak<Communicator>,
}

impl Communicator {
    /// Creates the engine with an optional provider and the transport's
    /// outbound hook. The pending table starts empty and ids start at 0.
    pub fn new(provider: Option<Provider>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            transport,
            provider: Mutex::new(provider),
            pending: DashMap::new(),
            uid: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    /// A fresh driver rooted at this communicator with an empty member
    /// path. Any number of drivers may coexist; each holds only a weak
    /// back-reference.
    pub fn driver(&self) -> Driver {
        Driver::root(self.weak_self.clone())
    }

    /// Whether [`Communicator::shutdown`] already ran.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a function invoke and suspends until the matching return.
    ///
    /// If the transport's readiness check fails, the suspension completes
    /// immediately with that error and nothing is registered. A failed
    /// hand-off to the transport removes the registration again.
    pub(crate) async fn send_invoke(
        &self,
        listener: String,
        parameters: Vec<Parameter>,
    ) -> CallResult<Value> {
        // The lifecycle gate first: a transport that tracks states reports
        // *why* the connection is unusable; the latch only knows that the
        // drain already ran.
        self.transport.inspect()?;
        if self.is_closed() {
            return Err(CallError::Shutdown(None));
        }

        let uid = self.uid.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(uid, tx);

        // A shutdown may have drained the table between the gate above and
        // the insert; the entry would then dangle forever.
        if self.is_closed() {
            self.pending.remove(&uid);
            return Err(CallError::Shutdown(None));
        }

        let invoke = Invoke::function(uid, listener, parameters);
        if let Err(e) = self.transport.send(&invoke) {
            self.pending.remove(&uid);
            return Err(CallError::Transport(e));
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CallError::Shutdown(None)),
        }
    }

    /// Routes one inbound record.
    ///
    /// Transports call this for every decoded payload, in delivery order.
    /// Function records begin executing in that order but run as their own
    /// tasks, so a suspending provider method never blocks the records
    /// behind it; returns complete their suspension inline.
    pub async fn deliver(&self, invoke: Invoke) {
        match invoke {
            Invoke::Function(call) => {
                // The upgrade only fails during teardown of the last
                // handle, at which point replies could not be sent anyway.
                if let Some(communicator) = self.weak_self.upgrade() {
                    tokio::spawn(async move { communicator.handle_call(call).await });
                }
            }
            Invoke::Return(ret) => self.handle_return(ret),
        }
    }

    /// Resolves and applies an inbound call, then emits its return.
    ///
    /// Resolution and execution failures are encoded into a failure return
    /// rather than escaping; a return that the transport no longer accepts
    /// (close in progress) is dropped.
    async fn handle_call(&self, call: FunctionInvoke) {
        let uid = call.uid;
        let reply = match self.apply(call).await {
            Ok(value) => Invoke::success(uid, value),
            Err(fault) => Invoke::failure(uid, &fault),
        };
        if let Err(e) = self.transport.send(&reply) {
            tracing::debug!("return {} dropped by transport: {}", uid, e);
        }
    }

    async fn apply(&self, call: FunctionInvoke) -> Result<Value, Fault> {
        let method = {
            let guard = self.provider.lock().expect("provider lock poisoned");
            match guard.as_ref() {
                None => return Err(Fault::no_provider()),
                Some(provider) => provider.resolve(&call.listener)?,
            }
        };
        method.call(call.parameters).await
    }

    /// Completes the matching suspension, or drops the record silently
    /// when no entry exists (already cancelled, drained, or duplicated).
    fn handle_return(&self, ret: ReturnInvoke) {
        let Some((_, completion)) = self.pending.remove(&ret.uid) else {
            tracing::trace!("return {} has no pending call; dropped", ret.uid);
            return;
        };
        let outcome = if ret.success {
            Ok(ret.value)
        } else {
            Err(CallError::from_wire(ret.value))
        };
        let _ = completion.send(outcome);
    }

    /// Fails every pending call and detaches the provider.
    ///
    /// Entries complete in insertion order with the given close error, or a
    /// generic shutdown error when none is given. Idempotent: a second call
    /// finds the latch set and returns with the table already empty.
    pub fn shutdown(&self, error: Option<Fault>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.provider.lock().expect("provider lock poisoned").take();

        // Ids are monotonic, so uid order is insertion order.
        let mut uids: Vec<u32> = self.pending.iter().map(|entry| *entry.key()).collect();
        uids.sort_unstable();
        if !uids.is_empty() {
            tracing::debug!("failing {} pending calls on shutdown", uids.len());
        }
        for uid in uids {
            if let Some((_, completion)) = self.pending.remove(&uid) {
                let _ = completion.send(Err(CallError::Shutdown(error.clone())));
            }
        }
    }
}
