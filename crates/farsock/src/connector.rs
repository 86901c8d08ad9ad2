//! # WebSocket Client Side
//!
//! [`WsConnector`] dials a server, optionally exposing a provider of its
//! own: the connection is bidirectional, so an accepted server may drive
//! the client just as the client drives the server.

use std::sync::Arc;

use farrpc::acceptor::Lifecycle;
use farrpc::acceptor::State;
use farrpc::error::StateError;
use farrpc::provider::Provider;
use farrpc::Driver;

use crate::link::Link;
use crate::Error;

/// A connected WebSocket client.
pub struct WsConnector {
    url: String,
    lifecycle: Arc<Lifecycle>,
    link: Link,
}

impl WsConnector {
    /// Dials `url` and completes the upgrade. The returned connector is
    /// open and ready for calls in both directions.
    pub async fn connect(url: &str, provider: Option<Provider>) -> Result<Self, Error> {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.begin_open().map_err(Error::State)?;
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;
        let link = Link::start(ws, lifecycle.clone(), provider);
        lifecycle.finish_open().map_err(Error::State)?;
        tracing::debug!("connected to {}", url);
        Ok(Self {
            url: url.to_string(),
            lifecycle,
            link,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    /// A fresh driver over the server's provider.
    pub fn driver(&self) -> Result<Driver, StateError> {
        self.lifecycle.inspect()?;
        Ok(self.link.communicator().driver())
    }

    /// Closes the connection: drains pending calls, then waits for the
    /// socket teardown to be confirmed. A second close observes the
    /// closing or closed state and fails with a domain error.
    pub async fn close(&self) -> Result<(), StateError> {
        self.link.close().await
    }

    /// Waits until the connection has fully shut down, without initiating
    /// a close (for example after a server-side close).
    pub async fn join(&self) {
        self.link.join().await;
    }
}
