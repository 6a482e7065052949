//! Integration tests for orca-gnmi against an in-process gNMI device.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

use orca_gnmi::config::{DeviceConfig, PollSettings};
use orca_gnmi::gnmi::g_nmi_server::{GNmi, GNmiServer};
use orca_gnmi::gnmi::typed_value::Value;
use orca_gnmi::gnmi::{GetRequest, GetResponse, Notification, TypedValue, Update};
use orca_gnmi::handler::merge_json_updates;
use orca_gnmi::{
    CallId, ChannelManager, GetOptions, GnmiError, Poller, RequestDispatcher, ResponseHandler,
    TickOutcome, build_get_request, build_path,
};

const ETHERNET0: &str = "/openconfig-interfaces:interfaces/interface[name=Ethernet0]/config";
const USERNAME: &str = "admin";
const PASSWORD: &str = "YourPaSsWoRd";

/// What the device saw for one Get.
#[derive(Debug, Clone)]
struct SeenRequest {
    username: Option<String>,
    password: Option<String>,
    request: GetRequest,
}

/// Answers Get with the interface config when the credentials match.
#[derive(Clone, Default)]
struct FakeDevice {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FakeDevice {
    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[tonic::async_trait]
impl GNmi for FakeDevice {
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let header = |key: &str| {
            request
                .metadata()
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let seen = SeenRequest {
            username: header("username"),
            password: header("password"),
            request: request.get_ref().clone(),
        };
        self.seen.lock().unwrap().push(seen.clone());

        if seen.username.as_deref() != Some(USERNAME) || seen.password.as_deref() != Some(PASSWORD)
        {
            return Err(Status::unauthenticated("invalid username or password"));
        }

        let notification = seen
            .request
            .path
            .iter()
            .map(|path| Notification {
                timestamp: 1_700_000_000_000_000_000,
                update: vec![Update {
                    path: Some(path.clone()),
                    val: Some(TypedValue {
                        value: Some(Value::JsonIetfVal(
                            br#"{"openconfig-interfaces:config":{"name":"Ethernet0","mtu":9100}}"#
                                .to_vec(),
                        )),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .collect();

        Ok(Response::new(GetResponse { notification }))
    }
}

async fn start_device(device: FakeDevice) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(GNmiServer::new(device))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

/// An address nothing listens on.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Value(CallId),
    Error(CallId, Option<Code>),
    Complete(CallId),
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl ResponseHandler for RecordingHandler {
    fn on_value(&self, call: CallId, _response: &GetResponse) {
        self.events.lock().unwrap().push(Event::Value(call));
    }

    fn on_error(&self, call: CallId, error: &GnmiError) {
        self.events.lock().unwrap().push(Event::Error(call, error.code()));
    }

    fn on_complete(&self, call: CallId) {
        self.events.lock().unwrap().push(Event::Complete(call));
    }
}

#[tokio::test]
async fn test_get_carries_credentials_and_verbatim_path() {
    let device = FakeDevice::default();
    let addr = start_device(device.clone()).await;

    let manager = ChannelManager::open(&addr.ip().to_string(), addr.port()).unwrap();
    let stub = manager.attach_credentials(USERNAME, PASSWORD).unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let dispatcher = RequestDispatcher::new(stub, handler.clone());

    let pending = dispatcher.send_get(build_get_request(vec![build_path(ETHERNET0)]));
    let id = pending.id();
    let response = pending.wait().await.expect("Get should succeed");

    // The device received both headers and the single-element path
    let seen = device.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].username.as_deref(), Some(USERNAME));
    assert_eq!(seen[0].password.as_deref(), Some(PASSWORD));
    assert_eq!(seen[0].request.path.len(), 1);
    assert_eq!(seen[0].request.path[0].elem.len(), 1);
    assert_eq!(seen[0].request.path[0].elem[0].name, ETHERNET0);

    // One value, then completion
    assert_eq!(handler.events(), vec![Event::Value(id), Event::Complete(id)]);

    let merged = merge_json_updates(&response);
    assert_eq!(merged["openconfig-interfaces:config"]["mtu"], 9100);

    manager.close();
}

#[tokio::test]
async fn test_rejected_credentials_surface_as_call_error() {
    let device = FakeDevice::default();
    let addr = start_device(device.clone()).await;

    let manager = ChannelManager::open(&addr.ip().to_string(), addr.port()).unwrap();
    let stub = manager.attach_credentials(USERNAME, "wrong").unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let dispatcher = RequestDispatcher::new(stub, handler.clone());

    let pending = dispatcher.send_get(build_get_request(vec![build_path(ETHERNET0)]));
    let id = pending.id();
    let err = pending.wait().await.unwrap_err();

    assert_eq!(err.code(), Some(Code::Unauthenticated));
    assert_eq!(
        handler.events(),
        vec![Event::Error(id, Some(Code::Unauthenticated))]
    );
}

#[tokio::test]
async fn test_stub_without_credentials_sends_no_headers() {
    let device = FakeDevice::default();
    let addr = start_device(device.clone()).await;

    let manager = ChannelManager::open(&addr.ip().to_string(), addr.port()).unwrap();
    let dispatcher = RequestDispatcher::new(manager.stub(), Arc::new(RecordingHandler::default()));

    let result = dispatcher
        .send_get(build_get_request(vec![build_path(ETHERNET0)]))
        .wait()
        .await;

    assert!(result.is_err());
    let seen = device.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].username.is_none());
    assert!(seen[0].password.is_none());
}

#[tokio::test]
async fn test_poller_against_device() {
    let device = FakeDevice::default();
    let addr = start_device(device.clone()).await;

    let manager = ChannelManager::from_device(&DeviceConfig {
        address: addr.ip().to_string(),
        port: addr.port(),
        credentials: None,
        connect_timeout_ms: Some(1000),
        request_timeout_ms: Some(5000),
    })
    .unwrap();
    let stub = manager.attach_credentials(USERNAME, PASSWORD).unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let poller = Poller::new(
        RequestDispatcher::new(stub, handler.clone()),
        vec![ETHERNET0.to_string(), "/openconfig-system:system/config".to_string()],
        GetOptions::default(),
        PollSettings {
            ticks: 3,
            interval_ms: 20,
            drain_outstanding: true,
        },
    )
    .unwrap();
    let (_tx, rx) = watch::channel(false);

    let report = poller.run(rx).await;

    assert_eq!(report.dispatched(), 3);
    assert_eq!(report.completed(), 3);
    for tick in &report.ticks {
        assert!(matches!(tick.outcome, TickOutcome::Completed { notifications: 2 }));
    }

    let seen = device.seen();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|s| s.request.path.len() == 2));

    let values = handler
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Value(_)))
        .count();
    assert_eq!(values, 3);
}

#[tokio::test]
async fn test_unreachable_device_still_reaches_last_tick() {
    let addr = closed_port().await;

    let manager = ChannelManager::open(&addr.ip().to_string(), addr.port()).unwrap();
    let stub = manager.attach_credentials(USERNAME, PASSWORD).unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let poller = Poller::new(
        RequestDispatcher::new(stub, handler.clone()),
        vec![ETHERNET0.to_string()],
        GetOptions::default(),
        PollSettings {
            ticks: 4,
            interval_ms: 10,
            drain_outstanding: true,
        },
    )
    .unwrap();
    let (_tx, rx) = watch::channel(false);

    let report = poller.run(rx).await;

    assert_eq!(report.ticks.last().map(|t| t.tick), Some(4));
    assert_eq!(report.failed(), 4);
    assert!(report.ticks.iter().all(|t| matches!(
        &t.outcome,
        TickOutcome::Failed(err) if err.code() == Some(Code::Unavailable)
    )));

    let errors = handler
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Error(..)))
        .count();
    assert_eq!(errors, 4);
}
