//! Shared wiring between a WebSocket stream and a communicator: one writer
//! task owning the sink, one reader pump owning the stream, and the
//! outbound adapter handed to the engine.

use std::sync::Arc;
use std::sync::Mutex;

use futures_util::SinkExt;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use farrpc::acceptor::Lifecycle;
use farrpc::acceptor::State;
use farrpc::error::Fault;
use farrpc::error::StateError;
use farrpc::invoke::Invoke;
use farrpc::provider::Provider;
use farrpc::transport;
use farrpc::transport::Transport;
use farrpc::Communicator;

use crate::CLEAN_CLOSE_CODES;

enum Outbound {
    Text(String),
    Close,
}

/// Outbound adapter: readiness from the shared lifecycle, records queued
/// to the writer task. Synchronous with respect to the communicator.
struct WsTransport {
    lifecycle: Arc<Lifecycle>,
    out: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

impl WsTransport {
    fn push(&self, frame: Outbound) -> transport::Result<()> {
        let guard = self.out.lock().expect("outbound lock poisoned");
        let out = guard
            .as_ref()
            .ok_or_else(|| transport::Error::ConnectionLost("socket closed".into()))?;
        out.send(frame)
            .map_err(|_| transport::Error::ConnectionLost("writer task gone".into()))
    }

    fn sever(&self) {
        self.out.lock().expect("outbound lock poisoned").take();
    }
}

impl Transport for WsTransport {
    fn inspect(&self) -> Result<(), StateError> {
        self.lifecycle.inspect()
    }

    fn send(&self, invoke: &Invoke) -> transport::Result<()> {
        let text = invoke
            .to_text()
            .map_err(|e| transport::Error::Io(e.to_string()))?;
        self.push(Outbound::Text(text))
    }
}

/// A live connection: communicator plus the two I/O tasks. Handles are
/// shared, so clones observe the same connection.
#[derive(Clone)]
pub(crate) struct Link {
    lifecycle: Arc<Lifecycle>,
    communicator: Arc<Communicator>,
    transport: Arc<WsTransport>,
    done: watch::Receiver<bool>,
}

impl Link {
    /// Wires a completed WebSocket onto a fresh communicator and starts
    /// both I/O tasks.
    pub(crate) fn start<S>(
        ws: WebSocketStream<S>,
        lifecycle: Arc<Lifecycle>,
        provider: Option<Provider>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);

        let transport = Arc::new(WsTransport {
            lifecycle: lifecycle.clone(),
            out: Mutex::new(Some(out_tx)),
        });
        let communicator = Communicator::new(provider, transport.clone() as Arc<dyn Transport>);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let message = match frame {
                    Outbound::Text(text) => Message::Text(text.into()),
                    Outbound::Close => Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })),
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pump_lifecycle = lifecycle.clone();
        let pump_communicator = communicator.clone();
        let pump_transport = transport.clone();
        tokio::spawn(async move {
            let mut close_error: Option<Fault> = None;
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match Invoke::from_text(&text) {
                        Ok(invoke) => pump_communicator.deliver(invoke).await,
                        Err(e) => tracing::warn!("malformed payload dropped: {}", e),
                    },
                    Ok(Message::Close(frame)) => {
                        close_error = close_fault(frame.as_ref());
                    }
                    Ok(_) => {
                        // Pings are answered by tungstenite itself; other
                        // frame kinds carry nothing for the engine.
                    }
                    Err(e) => {
                        close_error =
                            Some(Fault::new("TransportError", format!("connection lost: {}", e)));
                        break;
                    }
                }
            }

            // Drain with the table in the closing state, then confirm.
            if pump_lifecycle.state() == State::Open {
                let _ = pump_lifecycle.begin_close();
            }
            pump_communicator.shutdown(close_error);
            let _ = pump_lifecycle.finish_close();
            pump_transport.sever();
            let _ = done_tx.send(true);
        });

        Self {
            lifecycle,
            communicator,
            transport,
            done: done_rx,
        }
    }

    pub(crate) fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    /// Requests a close and suspends until the pending table is drained
    /// and the socket is confirmed gone.
    pub(crate) async fn close(&self) -> Result<(), StateError> {
        self.lifecycle.begin_close()?;
        let _ = self.transport.push(Outbound::Close);
        self.join().await;
        Ok(())
    }

    /// Suspends until the connection has fully shut down, without
    /// initiating a close.
    pub(crate) async fn join(&self) {
        let mut done = self.done.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Maps a received close frame onto the error handed to the drain.
///
/// Codes in [`CLEAN_CLOSE_CODES`] (and a codeless close) shut down without
/// error; everything else fails the pending calls with a transport fault.
fn close_fault(frame: Option<&CloseFrame>) -> Option<Fault> {
    let frame = frame?;
    let code = u16::from(frame.code);
    if CLEAN_CLOSE_CODES.contains(&code) {
        return None;
    }
    Some(Fault::new(
        "TransportError",
        format!("abnormal close (code {}): {}", code, frame.reason),
    ))
}
