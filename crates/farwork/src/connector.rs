//! # Worker Parent Side
//!
//! Spawns a child process with piped stdio and speaks the line protocol
//! with it. Connection completes only after the `READY` round trip proves
//! the child's message pump is attached; a cooperative `CLOSE` hands the
//! child the chance to drain and exit on its own.

use std::sync::Arc;
use std::sync::Mutex;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::process::Child;
use tokio::process::Command;

use farrpc::acceptor::Lifecycle;
use farrpc::acceptor::State;
use farrpc::error::StateError;
use farrpc::provider::Provider;
use farrpc::Driver;

use crate::link::Link;
use crate::link::Role;
use crate::Error;

/// Parent-side endpoint of a worker connection.
pub struct WorkerConnector {
    lifecycle: Arc<Lifecycle>,
    link: Link,
    child: Mutex<Option<Child>>,
}

impl WorkerConnector {
    /// Spawns `program` with piped stdio and completes the handshake.
    ///
    /// The returned connector is open; the child observes the parent's
    /// records on stdin and answers on stdout.
    pub async fn spawn(
        program: &str,
        args: &[&str],
        provider: Option<Provider>,
    ) -> Result<Self, Error> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("child stdin not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("child stdout not piped".into()))?;

        let connector = Self::over(stdout, stdin, provider).await?;
        *connector.child.lock().expect("child lock poisoned") = Some(child);
        tracing::debug!("worker {} connected", program);
        Ok(connector)
    }

    /// Connects over an arbitrary stream pair instead of a spawned
    /// process; the peer must run a responder half on the other end.
    pub async fn over<R, W>(
        reader: R,
        writer: W,
        provider: Option<Provider>,
    ) -> Result<Self, Error>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.begin_open().map_err(Error::State)?;
        let link = Link::start(reader, writer, lifecycle.clone(), provider, Role::Initiator);
        link.send_ready().map_err(|e| Error::Handshake(e.to_string()))?;
        link.wait_ready()
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;
        lifecycle.finish_open().map_err(Error::State)?;
        Ok(Self {
            lifecycle,
            link,
            child: Mutex::new(None),
        })
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    /// A fresh driver over the worker's provider.
    pub fn driver(&self) -> Result<Driver, StateError> {
        self.lifecycle.inspect()?;
        Ok(self.link.communicator().driver())
    }

    /// Requests a cooperative close, drains, and reaps the child.
    pub async fn close(&self) -> Result<(), StateError> {
        self.link.close().await?;
        self.reap().await;
        Ok(())
    }

    /// Suspends until the worker has shut down (for example after the
    /// worker closed from its side), then reaps the child.
    pub async fn join(&self) {
        self.link.join().await;
        self.reap().await;
    }

    async fn reap(&self) {
        let child = self.child.lock().expect("child lock poisoned").take();
        if let Some(mut child) = child {
            match child.wait().await {
                Ok(status) => tracing::debug!("worker exited with {}", status),
                Err(e) => tracing::warn!("failed to reap worker: {}", e),
            }
        }
    }
}
