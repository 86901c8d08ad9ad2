//! # In-Process Duplex Transport
//!
//! A symmetric pseudo-transport connecting two communicators in the same
//! process over unbounded channels: records are handed over as decoded
//! values, there is no lifecycle state machine, and the readiness check is
//! constantly ready. Used by the test suites and by embedders that want
//! same-process wiring with full engine semantics.

use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::communicator::Communicator;
use crate::driver::Driver;
use crate::error::StateError;
use crate::invoke::Invoke;
use crate::provider::Provider;
use crate::transport;
use crate::transport::Transport;

/// Outbound half of one duplex endpoint.
pub struct DuplexTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Invoke>>>,
}

impl DuplexTransport {
    fn new(tx: mpsc::UnboundedSender<Invoke>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Severs the outbound direction; the peer's pump observes end of
    /// stream and drains.
    fn sever(&self) {
        self.tx.lock().expect("duplex lock poisoned").take();
    }
}

impl Transport for DuplexTransport {
    fn inspect(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn send(&self, invoke: &Invoke) -> transport::Result<()> {
        let guard = self.tx.lock().expect("duplex lock poisoned");
        let tx = guard
            .as_ref()
            .ok_or_else(|| transport::Error::ConnectionLost("endpoint closed".into()))?;
        tx.send(invoke.clone())
            .map_err(|_| transport::Error::ConnectionLost("peer endpoint dropped".into()))
    }
}

/// One side of an in-process connection.
pub struct DuplexPeer {
    communicator: Arc<Communicator>,
    transport: Arc<DuplexTransport>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Builds a connected pair of peers, each with its own provider and
/// communicator. Records sent by one side are delivered, in order, to the
/// other side's communicator.
pub fn link(
    provider_a: Option<Provider>,
    provider_b: Option<Provider>,
) -> (DuplexPeer, DuplexPeer) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    let a = DuplexPeer::start(provider_a, tx_a, rx_b);
    let b = DuplexPeer::start(provider_b, tx_b, rx_a);
    (a, b)
}

impl DuplexPeer {
    fn start(
        provider: Option<Provider>,
        tx: mpsc::UnboundedSender<Invoke>,
        mut rx: mpsc::UnboundedReceiver<Invoke>,
    ) -> Self {
        let transport = Arc::new(DuplexTransport::new(tx));
        let communicator = Communicator::new(provider, transport.clone() as Arc<dyn Transport>);

        // Deliveries are awaited one at a time, so this side processes
        // records in exactly the order the peer sent them.
        let pump_communicator = communicator.clone();
        let pump_transport = transport.clone();
        let pump = tokio::spawn(async move {
            while let Some(invoke) = rx.recv().await {
                pump_communicator.deliver(invoke).await;
            }
            pump_communicator.shutdown(None);
            pump_transport.sever();
        });

        Self {
            communicator,
            transport,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    /// A fresh driver over the peer's provider.
    pub fn driver(&self) -> Driver {
        self.communicator.driver()
    }

    /// Drains this side and severs the outbound direction. The peer
    /// observes end of stream, drains itself, and severs its own outbound
    /// direction in turn, which ends this side's pump.
    pub fn close(&self) {
        self.communicator.shutdown(None);
        self.transport.sever();
    }

    /// Waits until the inbound pump has ended (the peer closed).
    pub async fn join(&self) {
        let pump = self.pump.lock().expect("duplex lock poisoned").take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }
    }
}
