//! # WebSocket Server Side
//!
//! [`WsServer`] accepts raw connections and completes the HTTP upgrade;
//! each connection becomes a [`WsAcceptor`] that the application either
//! accepts with a provider or rejects. The upgrade path is captured so one
//! server can hand different providers to different URL paths.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::ToSocketAddrs;
use tokio_tungstenite::tungstenite::handshake::server::Request;
use tokio_tungstenite::tungstenite::handshake::server::Response;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use farrpc::acceptor::Lifecycle;
use farrpc::acceptor::State;
use farrpc::error::StateError;
use farrpc::provider::Provider;
use farrpc::Driver;

use crate::link::Link;
use crate::Error;

/// Listens for WebSocket connections.
pub struct WsServer {
    listener: TcpListener,
}

impl WsServer {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr().map_err(|e| Error::Io(e.to_string()))
    }

    /// Completes the next connection's upgrade and returns its acceptor,
    /// still undecided: the caller inspects [`WsAcceptor::path`] and then
    /// accepts or rejects.
    pub async fn accept(&self) -> Result<WsAcceptor, Error> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let path = Arc::new(Mutex::new(String::from("/")));
        let seen_path = path.clone();
        let callback = move |request: &Request, response: Response| {
            *seen_path.lock().expect("path lock poisoned") = request.uri().path().to_string();
            Ok(response)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let path = path.lock().expect("path lock poisoned").clone();
        tracing::debug!("connection from {} upgraded on {}", peer_addr, path);
        Ok(WsAcceptor::new(ws, path, peer_addr))
    }
}

/// One accepted connection, gated by the shared lifecycle.
pub struct WsAcceptor {
    path: String,
    peer_addr: SocketAddr,
    lifecycle: Arc<Lifecycle>,
    stream: Mutex<Option<WebSocketStream<TcpStream>>>,
    link: Mutex<Option<Link>>,
}

impl WsAcceptor {
    fn new(ws: WebSocketStream<TcpStream>, path: String, peer_addr: SocketAddr) -> Self {
        Self {
            path,
            peer_addr,
            lifecycle: Arc::new(Lifecycle::new()),
            stream: Mutex::new(Some(ws)),
            link: Mutex::new(None),
        }
    }

    /// The path of the HTTP upgrade URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    /// Exposes `provider` to the peer and starts serving.
    ///
    /// Only legal on an undecided acceptor; a second `accept` (or an
    /// `accept` after `reject`) fails synchronously with a domain error
    /// and leaves the original connection untouched.
    pub async fn accept(&self, provider: Provider) -> Result<(), StateError> {
        self.lifecycle.begin_accept()?;
        let ws = self
            .stream
            .lock()
            .expect("stream lock poisoned")
            .take()
            .expect("socket present while undecided");
        let link = Link::start(ws, self.lifecycle.clone(), Some(provider));
        *self.link.lock().expect("link lock poisoned") = Some(link);
        self.lifecycle.finish_accept()?;
        tracing::info!("accepted {} on {}", self.peer_addr, self.path);
        Ok(())
    }

    /// Refuses the connection with a policy close; nothing was pending, so
    /// the drain is trivially empty.
    pub async fn reject(&self, reason: &str) -> Result<(), StateError> {
        self.lifecycle.begin_reject()?;
        let mut ws = self
            .stream
            .lock()
            .expect("stream lock poisoned")
            .take()
            .expect("socket present while undecided");
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: reason.to_string().into(),
        };
        let _ = ws.send(Message::Close(Some(frame))).await;
        self.lifecycle.finish_close()?;
        tracing::info!("rejected {} on {}: {}", self.peer_addr, self.path, reason);
        Ok(())
    }

    /// A driver over the *client's* provider; the connection is
    /// bidirectional once accepted.
    pub fn driver(&self) -> Result<Driver, StateError> {
        self.lifecycle.inspect()?;
        let guard = self.link.lock().expect("link lock poisoned");
        let link = guard.as_ref().ok_or(StateError::NotOpened(self.state()))?;
        Ok(link.communicator().driver())
    }

    /// Closes the connection, draining pending calls before confirming.
    pub async fn close(&self) -> Result<(), StateError> {
        let link = {
            let guard = self.link.lock().expect("link lock poisoned");
            guard.as_ref().cloned()
        };
        match link {
            Some(link) => link.close().await,
            None => Err(StateError::NotOpened(self.state())),
        }
    }

    /// Waits until the connection has fully shut down.
    pub async fn join(&self) {
        let link = {
            let guard = self.link.lock().expect("link lock poisoned");
            guard.as_ref().cloned()
        };
        if let Some(link) = link {
            link.join().await;
        }
    }
}
