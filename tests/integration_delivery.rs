mod common;

use async_trait::async_trait;
use pushgate::adapters::transport::{RawResponse, Transport, TransportError};
use pushgate::adapters::{CachedTokenProvider, FreshToken, TokenSource};
use pushgate::services::ApnsService;
use pushgate::services::delivery::{DeliveryCoordinator, DeliveryOutcome};
use pushgate::{
    Device, Notification, Platform, PushService, Result as PushResult, ServiceResolver,
};
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct StaticTokenSource;

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn issue(&self) -> PushResult<FreshToken> {
        Ok(FreshToken { value: "provider-jwt".to_owned(), ttl: Duration::from_secs(1800) })
    }
}

#[derive(Debug, Clone)]
struct RecordedRequest {
    path: String,
    body: Value,
    headers: HeaderMap,
}

/// Records every request and replays a scripted sequence of responses.
#[derive(Debug)]
struct ScriptedTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<RawResponse>>,
}

impl ScriptedTransport {
    fn new(responses: impl IntoIterator<Item = RawResponse>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().collect()),
        })
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(
        &self,
        path: &str,
        body: &Value,
        headers: HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            path: path.to_owned(),
            body: body.clone(),
            headers,
        });
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RawResponse { status: 200, body: String::new() }))
    }
}

#[derive(Debug)]
struct TestDevice {
    token: &'static str,
    deactivations: AtomicUsize,
}

impl TestDevice {
    fn new(token: &'static str) -> Self {
        Self { token, deactivations: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Device for TestDevice {
    fn platform(&self) -> Platform {
        Platform::Apple
    }

    fn token(&self) -> &str {
        self.token
    }

    fn application(&self) -> &str {
        "chat"
    }

    async fn deactivate(&self) -> anyhow::Result<()> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct FixedResolver {
    service: Arc<dyn PushService>,
}

impl ServiceResolver for FixedResolver {
    fn resolve(&self, _: Platform, _: &str) -> PushResult<Arc<dyn PushService>> {
        Ok(Arc::clone(&self.service))
    }
}

fn apns_coordinator(transport: &Arc<ScriptedTransport>) -> DeliveryCoordinator {
    let service = ApnsService::with_parts(
        "com.example.chat".to_owned(),
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(CachedTokenProvider::new(StaticTokenSource)),
    );
    DeliveryCoordinator::with_resolver(
        Arc::new(FixedResolver { service: Arc::new(service) }),
        true,
    )
}

#[tokio::test]
async fn apns_delivery_end_to_end() {
    common::setup_tracing();
    let transport = ScriptedTransport::new([RawResponse { status: 200, body: String::new() }]);
    let coordinator = apns_coordinator(&transport);

    let notification = Notification::new().title("Hi").body("there");
    let device = TestDevice::new("abc");

    let outcome = coordinator.deliver(&notification, &device).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);
    assert_eq!(device.deactivations.load(Ordering::SeqCst), 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/3/device/abc");
    assert_eq!(request.body["aps"]["alert"], json!({ "title": "Hi", "body": "there" }));

    assert_eq!(request.headers.get("authorization").unwrap(), "Bearer provider-jwt");
    assert_eq!(request.headers.get("apns-topic").unwrap(), "com.example.chat");
    assert_eq!(request.headers.get("apns-push-type").unwrap(), "alert");
    assert!(request.headers.contains_key("apns-id"));
}

#[tokio::test]
async fn unregistered_token_deactivates_the_device() {
    common::setup_tracing();
    let transport = ScriptedTransport::new([RawResponse {
        status: 410,
        body: json!({ "reason": "Unregistered" }).to_string(),
    }]);
    let coordinator = apns_coordinator(&transport);

    let device = TestDevice::new("stale");
    let outcome =
        coordinator.deliver(&Notification::new().title("Hi"), &device).await.unwrap();

    assert_eq!(outcome, DeliveryOutcome::DeviceDeactivated);
    assert_eq!(device.deactivations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn provider_jwt_is_fetched_once_across_deliveries() {
    common::setup_tracing();

    #[derive(Debug)]
    struct CountingSource(Arc<AtomicUsize>);

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue(&self) -> PushResult<FreshToken> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(FreshToken { value: "jwt".to_owned(), ttl: Duration::from_secs(1800) })
        }
    }

    let issued = Arc::new(AtomicUsize::new(0));
    let transport = ScriptedTransport::new([]);
    let service = ApnsService::with_parts(
        "com.example.chat".to_owned(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(CachedTokenProvider::new(CountingSource(Arc::clone(&issued)))),
    );
    let coordinator = DeliveryCoordinator::with_resolver(
        Arc::new(FixedResolver { service: Arc::new(service) }),
        true,
    );

    let notification = Notification::new().title("Hi");
    for _ in 0..3 {
        coordinator.deliver(&notification, &TestDevice::new("abc")).await.unwrap();
    }

    assert_eq!(issued.load(Ordering::SeqCst), 1);
    assert_eq!(transport.requests().len(), 3);
}
