//! Unit tests for the wire records, lifecycle, provider resolution, and
//! the communicator's registry behavior, using mock transports.

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::acceptor::Lifecycle;
use crate::acceptor::State;
use crate::communicator::Communicator;
use crate::error::CallError;
use crate::error::Fault;
use crate::error::StateError;
use crate::invoke::Invoke;
use crate::invoke::Parameter;
use crate::provider::Provider;
use crate::transport;
use crate::transport::Transport;

/// Records every outbound invoke and echoes a success return for each
/// function record, so suspensions settle without a real peer.
struct EchoTransport {
    sent: Mutex<Vec<Invoke>>,
    echo: mpsc::UnboundedSender<Invoke>,
}

impl EchoTransport {
    fn create() -> (Arc<Self>, mpsc::UnboundedReceiver<Invoke>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            echo: tx,
        });
        (transport, rx)
    }

    fn sent_uids(&self) -> Vec<u32> {
        self.sent.lock().unwrap().iter().map(Invoke::uid).collect()
    }
}

impl Transport for EchoTransport {
    fn inspect(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn send(&self, invoke: &Invoke) -> transport::Result<()> {
        self.sent.lock().unwrap().push(invoke.clone());
        if let Invoke::Function(call) = invoke {
            let _ = self
                .echo
                .send(Invoke::success(call.uid, json!(call.parameters.len())));
        }
        Ok(())
    }
}

/// Accepts every record and never produces a return.
struct SilentTransport;

impl Transport for SilentTransport {
    fn inspect(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn send(&self, _invoke: &Invoke) -> transport::Result<()> {
        Ok(())
    }
}

/// Fails the readiness gate.
struct NotReadyTransport;

impl Transport for NotReadyTransport {
    fn inspect(&self) -> Result<(), StateError> {
        Err(StateError::ClosingInProgress)
    }

    fn send(&self, _invoke: &Invoke) -> transport::Result<()> {
        Ok(())
    }
}

/// Refuses every hand-off.
struct BrokenTransport;

impl Transport for BrokenTransport {
    fn inspect(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn send(&self, _invoke: &Invoke) -> transport::Result<()> {
        Err(transport::Error::ConnectionLost("wire cut".into()))
    }
}

fn spawn_echo_pump(
    communicator: Arc<Communicator>,
    mut rx: mpsc::UnboundedReceiver<Invoke>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(invoke) = rx.recv().await {
            communicator.deliver(invoke).await;
        }
    })
}

// --- Wire records ---

#[test]
fn function_record_round_trips_with_listener_field() {
    let invoke = Invoke::function(3, "math.add", vec![Parameter::plain(1), Parameter::plain(2)]);
    let text = invoke.to_text().unwrap();
    assert!(text.contains("\"listener\":\"math.add\""));
    assert!(!text.contains("success"));
    assert_eq!(Invoke::from_text(&text).unwrap(), invoke);
}

#[test]
fn return_record_round_trips_with_success_field() {
    let invoke = Invoke::success(7, json!([4, 6]));
    let text = invoke.to_text().unwrap();
    assert!(text.contains("\"success\":true"));
    assert!(!text.contains("listener"));
    assert_eq!(Invoke::from_text(&text).unwrap(), invoke);
}

#[test]
fn failure_record_carries_error_descriptor() {
    let fault = Fault::new("RangeError", "oops");
    let text = Invoke::failure(1, &fault).to_text().unwrap();
    let decoded = Invoke::from_text(&text).unwrap();
    let Invoke::Return(ret) = decoded else {
        panic!("expected return variant");
    };
    assert!(!ret.success);
    assert_eq!(ret.value["name"], "RangeError");
    assert_eq!(ret.value["message"], "oops");
    assert_eq!(ret.value["stack"], "RangeError: oops");
}

#[test]
fn serializable_parameter_keeps_its_tag() {
    let parameter = Parameter::serializable("{\"nested\":true}");
    let text = serde_json::to_string(&parameter).unwrap();
    assert!(text.contains("\"type\":\"serializable\""));
    let decoded: Parameter = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded, parameter);
    assert_eq!(decoded.into_value(), Value::String("{\"nested\":true}".into()));
}

#[test]
fn plain_object_parameter_is_not_mistaken_for_serializable() {
    let decoded: Parameter = serde_json::from_str("{\"type\":\"other\",\"value\":1}").unwrap();
    assert!(matches!(decoded, Parameter::Plain(_)));
}

#[test]
fn malformed_payload_is_a_codec_error() {
    assert!(Invoke::from_text("READY").is_err());
    assert!(Invoke::from_text("{\"uid\":1}").is_err());
}

// --- Lifecycle ---

#[test]
fn accept_path_reaches_open() {
    let lifecycle = Lifecycle::new();
    assert_eq!(lifecycle.state(), State::None);
    lifecycle.begin_accept().unwrap();
    lifecycle.finish_accept().unwrap();
    assert_eq!(lifecycle.state(), State::Open);
    assert!(lifecycle.inspect().is_ok());
}

#[test]
fn double_accept_is_a_domain_error() {
    let lifecycle = Lifecycle::new();
    lifecycle.begin_accept().unwrap();
    lifecycle.finish_accept().unwrap();
    let err = lifecycle.begin_accept().unwrap_err();
    assert_eq!(
        err,
        StateError::IllegalTransition {
            from: State::Open,
            to: State::Accepting,
        }
    );
    // The original acceptance is untouched.
    assert_eq!(lifecycle.state(), State::Open);
}

#[test]
fn reject_path_reaches_closed() {
    let lifecycle = Lifecycle::new();
    lifecycle.begin_reject().unwrap();
    lifecycle.finish_close().unwrap();
    assert_eq!(lifecycle.state(), State::Closed);
    assert_eq!(lifecycle.inspect().unwrap_err(), StateError::AlreadyClosed);
}

#[test]
fn close_before_open_is_not_opened() {
    let lifecycle = Lifecycle::new();
    assert_eq!(
        lifecycle.begin_close().unwrap_err(),
        StateError::NotOpened(State::None)
    );
}

#[test]
fn double_close_observes_closing_then_closed() {
    let lifecycle = Lifecycle::new();
    lifecycle.begin_accept().unwrap();
    lifecycle.finish_accept().unwrap();
    lifecycle.begin_close().unwrap();
    assert_eq!(
        lifecycle.begin_close().unwrap_err(),
        StateError::ClosingInProgress
    );
    lifecycle.finish_close().unwrap();
    assert_eq!(lifecycle.begin_close().unwrap_err(), StateError::AlreadyClosed);
}

#[test]
fn server_side_reopen_after_close() {
    let lifecycle = Lifecycle::new();
    lifecycle.begin_accept().unwrap();
    lifecycle.finish_accept().unwrap();
    lifecycle.begin_close().unwrap();
    lifecycle.finish_close().unwrap();
    lifecycle.begin_open().unwrap();
    lifecycle.finish_open().unwrap();
    assert_eq!(lifecycle.state(), State::Open);
}

// --- Provider resolution ---

fn nested_provider() -> Provider {
    Provider::new().object(
        "a",
        Provider::new().object(
            "b",
            Provider::new().method("c", |(x,): (i64,)| async move { Ok(x + 1) }),
        ),
    )
}

#[tokio::test]
async fn resolves_nested_member_path() {
    let method = nested_provider().resolve("a.b.c").unwrap();
    let value = method.call(vec![Parameter::plain(41)]).await.unwrap();
    assert_eq!(value, json!(42));
}

#[test]
fn unknown_member_is_a_resolution_fault() {
    let err = nested_provider().resolve("a.b.d").unwrap_err();
    assert_eq!(err.name, crate::error::RESOLUTION_ERROR);
    assert!(err.message.contains("'d'"));
}

#[test]
fn object_in_final_position_is_not_a_function() {
    let err = nested_provider().resolve("a.b").unwrap_err();
    assert_eq!(err.name, crate::error::RESOLUTION_ERROR);
    assert!(err.message.contains("not a function"));
}

#[test]
fn method_in_intermediate_position_is_a_resolution_fault() {
    let err = nested_provider().resolve("a.b.c.d").unwrap_err();
    assert_eq!(err.name, crate::error::RESOLUTION_ERROR);
}

#[test]
fn empty_path_is_a_resolution_fault() {
    let err = Provider::new().resolve("").unwrap_err();
    assert_eq!(err.name, crate::error::RESOLUTION_ERROR);
}

#[tokio::test]
async fn zero_argument_method_accepts_empty_parameters() {
    let provider = Provider::new().method("now", |_: ()| async move { Ok("tick") });
    let method = provider.resolve("now").unwrap();
    let value = method.call(Vec::new()).await.unwrap();
    assert_eq!(value, json!("tick"));
}

#[tokio::test]
async fn argument_mismatch_is_a_fault_not_a_panic() {
    let provider = Provider::new().method("add", |(a, b): (f64, f64)| async move { Ok(a + b) });
    let method = provider.resolve("add").unwrap();
    let err = method
        .call(vec![Parameter::plain("not a number")])
        .await
        .unwrap_err();
    assert_eq!(err.name, "ArgumentError");
}

#[tokio::test]
async fn serializable_parameter_surfaces_as_its_payload() {
    let provider = Provider::new().method("echo", |(text,): (String,)| async move { Ok(text) });
    let method = provider.resolve("echo").unwrap();
    let value = method
        .call(vec![Parameter::serializable("payload")])
        .await
        .unwrap();
    assert_eq!(value, json!("payload"));
}

// --- Communicator registry ---

#[tokio::test]
async fn uids_are_strictly_increasing_from_zero() {
    let (transport, rx) = EchoTransport::create();
    let communicator = Communicator::new(None, transport.clone() as Arc<dyn Transport>);
    let pump = spawn_echo_pump(communicator.clone(), rx);

    let driver = communicator.driver();
    for k in 0..5u32 {
        let echoed: usize = driver.member("probe").call((k,)).await.unwrap();
        assert_eq!(echoed, 1);
    }

    assert_eq!(transport.sent_uids(), vec![0, 1, 2, 3, 4]);
    pump.abort();
}

#[tokio::test]
async fn return_with_unknown_uid_is_dropped() {
    let (transport, rx) = EchoTransport::create();
    let communicator = Communicator::new(None, transport.clone() as Arc<dyn Transport>);
    let pump = spawn_echo_pump(communicator.clone(), rx);

    communicator.deliver(Invoke::success(999, json!(1))).await;

    // Id allocation and correlation are unaffected.
    let driver = communicator.driver();
    let echoed: usize = driver.member("probe").call(()).await.unwrap();
    assert_eq!(echoed, 0);
    assert_eq!(transport.sent_uids(), vec![0]);
    pump.abort();
}

#[tokio::test]
async fn failed_readiness_check_settles_immediately() {
    let communicator = Communicator::new(None, Arc::new(NotReadyTransport) as Arc<dyn Transport>);
    let err = communicator
        .driver()
        .member("x")
        .call::<_, Value>(())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::State(StateError::ClosingInProgress)
    ));
}

#[tokio::test]
async fn failed_send_settles_with_the_transport_error() {
    let communicator = Communicator::new(None, Arc::new(BrokenTransport) as Arc<dyn Transport>);
    let err = communicator
        .driver()
        .member("x")
        .call::<_, Value>(())
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Transport(_)));
    // The failed call left no pending entry behind.
    communicator.shutdown(None);
}

#[tokio::test]
async fn shutdown_fails_all_pending_calls_with_the_close_error() {
    let communicator = Communicator::new(None, Arc::new(SilentTransport) as Arc<dyn Transport>);
    let driver = communicator.driver();

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let driver = driver.clone();
        waiters.push(tokio::spawn(async move {
            driver.member("stuck").call::<_, Value>(()).await
        }));
    }
    // Let every call register its pending entry.
    tokio::task::yield_now().await;

    let fault = Fault::new("TransportError", "carrier lost");
    communicator.shutdown(Some(fault.clone()));
    communicator.shutdown(None); // idempotent

    for waiter in waiters {
        let err = waiter.await.unwrap().unwrap_err();
        match err {
            CallError::Shutdown(Some(cause)) => assert_eq!(cause, fault),
            other => panic!("expected shutdown error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn send_after_shutdown_settles_immediately() {
    let communicator = Communicator::new(None, Arc::new(SilentTransport) as Arc<dyn Transport>);
    communicator.shutdown(None);
    let err = communicator
        .driver()
        .member("x")
        .call::<_, Value>(())
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Shutdown(None)));
}

#[tokio::test]
async fn return_racing_shutdown_still_succeeds() {
    let (transport, _rx) = EchoTransport::create();
    let communicator = Communicator::new(None, transport as Arc<dyn Transport>);
    let driver = communicator.driver();

    let waiter = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.member("probe").call::<_, usize>(()).await })
    };
    tokio::task::yield_now().await;

    // The return arrives just before the shutdown drains the table.
    communicator.deliver(Invoke::success(0, json!(0))).await;
    communicator.shutdown(None);

    assert_eq!(waiter.await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn inbound_call_without_provider_returns_a_no_provider_failure() {
    let (transport, _rx) = EchoTransport::create();
    let communicator = Communicator::new(None, transport.clone() as Arc<dyn Transport>);

    communicator
        .deliver(Invoke::function(5, "anything", Vec::new()))
        .await;
    // The call runs as its own task; let it emit the failure return.
    tokio::task::yield_now().await;

    let sent = transport.sent.lock().unwrap();
    let Invoke::Return(ret) = &sent[0] else {
        panic!("expected a return record");
    };
    assert_eq!(ret.uid, 5);
    assert!(!ret.success);
    assert_eq!(ret.value["name"], crate::error::NO_PROVIDER_ERROR);
}

#[tokio::test]
async fn driver_outliving_its_communicator_fails_cleanly() {
    let communicator = Communicator::new(None, Arc::new(SilentTransport) as Arc<dyn Transport>);
    let driver = communicator.driver();
    drop(communicator);
    let err = driver.member("x").call::<_, Value>(()).await.unwrap_err();
    assert!(matches!(err, CallError::Shutdown(None)));
}

#[tokio::test]
async fn driver_root_is_not_callable() {
    let communicator = Communicator::new(None, Arc::new(SilentTransport) as Arc<dyn Transport>);
    let err = communicator.driver().call::<_, Value>(()).await.unwrap_err();
    assert!(matches!(err, CallError::Codec(_)));
}

#[test]
fn driver_member_access_builds_dotted_paths() {
    let communicator = Communicator::new(None, Arc::new(SilentTransport) as Arc<dyn Transport>);
    let driver = communicator.driver();
    assert_eq!(driver.path(), "");
    assert_eq!(driver.member("math").path(), "math");
    assert_eq!(driver.member("math").member("add").path(), "math.add");
}

// --- Remote error reconstruction ---

#[test]
fn recognized_fault_names_become_tagged_variants() {
    let no_provider = CallError::from_wire(json!({
        "name": "NoProviderError", "message": "no provider", "stack": ""
    }));
    assert!(matches!(no_provider, CallError::NoProvider(_)));

    let resolution = CallError::from_wire(json!({
        "name": "ResolutionError", "message": "unknown member", "stack": ""
    }));
    assert!(matches!(resolution, CallError::Resolution(_)));
}

#[test]
fn unrecognized_fault_names_become_generic_remote_errors() {
    let err = CallError::from_wire(json!({
        "name": "RangeError", "message": "oops", "stack": "RangeError: oops"
    }));
    let CallError::Remote(fault) = err else {
        panic!("expected a remote error");
    };
    assert_eq!(fault.name, "RangeError");
    assert_eq!(fault.message, "oops");
}

#[test]
fn non_descriptor_failure_values_keep_the_original_payload() {
    let err = CallError::from_wire(json!("it broke"));
    let CallError::Remote(fault) = err else {
        panic!("expected a remote error");
    };
    assert!(fault.message.contains("it broke"));
}
