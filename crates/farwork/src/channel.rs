//! # Worker Child Side
//!
//! The half that runs inside the worker: it exposes a provider over the
//! parent's stream, echoes the `READY` probe, and treats `CLOSE` (or end
//! of stream) as the signal to drain and let the process finish.
//!
//! A worker's `main` is typically three lines:
//!
//! ```no_run
//! # async fn run() {
//! let channel = farwork::WorkerChannel::open(Some(farrpc::Provider::new())).await.unwrap();
//! channel.join().await;
//! // post-shutdown cleanup runs here, before the process exits
//! # }
//! ```

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;

use farrpc::acceptor::Lifecycle;
use farrpc::acceptor::State;
use farrpc::error::StateError;
use farrpc::provider::Provider;
use farrpc::Driver;

use crate::link::Link;
use crate::link::Role;
use crate::Error;

/// Child-side endpoint of a worker connection.
pub struct WorkerChannel {
    lifecycle: Arc<Lifecycle>,
    link: Link,
}

impl WorkerChannel {
    /// Attaches to the process's stdio and starts serving `provider`.
    pub async fn open(provider: Option<Provider>) -> Result<Self, Error> {
        Self::over(tokio::io::stdin(), tokio::io::stdout(), provider).await
    }

    /// Attaches over an arbitrary stream pair instead of stdio.
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
        lifecycle.begin_accept().map_err(Error::State)?;
        let link = Link::start(reader, writer, lifecycle.clone(), provider, Role::Responder);
        lifecycle.finish_accept().map_err(Error::State)?;
        Ok(Self { lifecycle, link })
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    /// A fresh driver over the parent's provider.
    pub fn driver(&self) -> Result<Driver, StateError> {
        self.lifecycle.inspect()?;
        Ok(self.link.communicator().driver())
    }

    /// Closes from the worker's side.
    pub async fn close(&self) -> Result<(), StateError> {
        self.link.close().await
    }

    /// Suspends until the parent closes (or the stream ends) and the
    /// drain has completed.
    pub async fn join(&self) {
        self.link.join().await;
    }
}
