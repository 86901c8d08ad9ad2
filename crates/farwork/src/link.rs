//! Line protocol shared by both halves of a worker connection.
//!
//! Each line is either a bare control string (`READY`, `CLOSE`) or one
//! JSON-encoded record; control strings are intercepted before any JSON
//! decoding. The halves differ only in their handshake role: the
//! initiator sends `READY` and waits for the echo, the responder echoes
//! every `READY` it receives.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::watch;

use farrpc::acceptor::Lifecycle;
use farrpc::acceptor::State;
use farrpc::error::Fault;
use farrpc::error::StateError;
use farrpc::invoke::Invoke;
use farrpc::provider::Provider;
use farrpc::transport;
use farrpc::transport::Inbound;
use farrpc::transport::Transport;
use farrpc::Communicator;

/// Which side of the handshake this half plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// Sends `READY`, treats the received echo as handshake completion.
    Initiator,
    /// Echoes every received `READY`.
    Responder,
}

/// Outbound adapter: lines queued to the writer task.
struct WorkerTransport {
    lifecycle: Arc<Lifecycle>,
    out: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl WorkerTransport {
    fn push(&self, line: String) -> transport::Result<()> {
        let guard = self.out.lock().expect("outbound lock poisoned");
        let out = guard
            .as_ref()
            .ok_or_else(|| transport::Error::ConnectionLost("stream closed".into()))?;
        out.send(line)
            .map_err(|_| transport::Error::ConnectionLost("writer task gone".into()))
    }

    fn sever(&self) {
        self.out.lock().expect("outbound lock poisoned").take();
    }
}

impl Transport for WorkerTransport {
    fn inspect(&self) -> Result<(), StateError> {
        self.lifecycle.inspect()
    }

    fn send(&self, invoke: &Invoke) -> transport::Result<()> {
        let text = invoke
            .to_text()
            .map_err(|e| transport::Error::Io(e.to_string()))?;
        self.push(text)
    }
}

/// A live worker connection over any byte stream pair.
#[derive(Clone)]
pub(crate) struct Link {
    lifecycle: Arc<Lifecycle>,
    communicator: Arc<Communicator>,
    transport: Arc<WorkerTransport>,
    closing: Arc<AtomicBool>,
    ready: watch::Receiver<bool>,
    done: watch::Receiver<bool>,
}

impl Link {
    pub(crate) fn start<R, W>(
        reader: R,
        writer: W,
        lifecycle: Arc<Lifecycle>,
        provider: Option<Provider>,
        role: Role,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (ready_tx, ready_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let closing = Arc::new(AtomicBool::new(false));

        let transport = Arc::new(WorkerTransport {
            lifecycle: lifecycle.clone(),
            out: Mutex::new(Some(out_tx)),
        });
        let communicator = Communicator::new(provider, transport.clone() as Arc<dyn Transport>);

        let mut writer = writer;
        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.write_all(b"\n").await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let pump_lifecycle = lifecycle.clone();
        let pump_communicator = communicator.clone();
        let pump_transport = transport.clone();
        let pump_closing = closing.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut close_error: Option<Fault> = None;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match farrpc::transport::classify(line.trim_end()) {
                        Inbound::Ready => match role {
                            Role::Responder => {
                                let _ =
                                    pump_transport.push(farrpc::transport::READY.to_string());
                            }
                            Role::Initiator => {
                                let _ = ready_tx.send(true);
                            }
                        },
                        Inbound::Close => {
                            // Cooperative shutdown requested by the peer.
                            pump_closing.store(true, Ordering::SeqCst);
                            break;
                        }
                        Inbound::Data(text) => match Invoke::from_text(text) {
                            Ok(invoke) => pump_communicator.deliver(invoke).await,
                            Err(e) => tracing::warn!("malformed payload dropped: {}", e),
                        },
                    },
                    Ok(None) => {
                        if !pump_closing.load(Ordering::SeqCst) {
                            close_error = Some(Fault::new(
                                "TransportError",
                                "stream ended without a close handshake",
                            ));
                        }
                        break;
                    }
                    Err(e) => {
                        close_error =
                            Some(Fault::new("TransportError", format!("read failed: {}", e)));
                        break;
                    }
                }
            }

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
            closing,
            ready: ready_rx,
            done: done_rx,
        }
    }

    pub(crate) fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    /// Sends the handshake probe (initiator side).
    pub(crate) fn send_ready(&self) -> transport::Result<()> {
        self.transport.push(farrpc::transport::READY.to_string())
    }

    /// Suspends until the peer echoed the handshake probe.
    pub(crate) async fn wait_ready(&self) -> transport::Result<()> {
        let mut ready = self.ready.clone();
        while !*ready.borrow() {
            if ready.changed().await.is_err() {
                return Err(transport::Error::Handshake(
                    "stream ended before the handshake echo".into(),
                ));
            }
        }
        Ok(())
    }

    /// Requests a cooperative close and suspends until drained.
    pub(crate) async fn close(&self) -> Result<(), StateError> {
        self.lifecycle.begin_close()?;
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.transport.push(farrpc::transport::CLOSE.to_string());
        self.join().await;
        Ok(())
    }

    /// Suspends until this half has fully shut down.
    pub(crate) async fn join(&self) {
        let mut done = self.done.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}
