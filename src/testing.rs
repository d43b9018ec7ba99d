//! In-memory doubles for the camera, OCR and backend seams, and a local
//! HTTP backend for exercising the real clients

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::csrf::CSRF_HEADER;
use crate::backend::{InvoiceBackend, VehicleLookup};
use crate::capture::frame::CapturedFrame;
use crate::capture::{CameraDevice, Facing};
use crate::config::ApiConfig;
use crate::error::{ApiError, CameraError, InvoiceError, LookupError, OcrError};
use crate::vision::{OcrAdapter, Recognition};
use crate::workflow::models::{LineItemPayload, SentInvoice, VehicleRecord};

/// Camera that counts track starts and stops
pub struct MockCamera {
    pub starts: u32,
    pub stops: u32,
    facing: Facing,
    deny: bool,
    streaming: bool,
    snapshots: u32,
    fail_after: Option<u32>,
}

impl MockCamera {
    /// Camera whose only device faces `facing`
    pub fn new(facing: Facing) -> Self {
        Self {
            starts: 0,
            stops: 0,
            facing,
            deny: false,
            streaming: false,
            snapshots: 0,
            fail_after: None,
        }
    }

    pub fn deny_permission(mut self) -> Self {
        self.deny = true;
        self
    }

    /// Deliver `n` frames, then report the stream as gone
    pub fn fail_snapshots_after(mut self, n: u32) -> Self {
        self.fail_after = Some(n);
        self
    }
}

#[async_trait]
impl CameraDevice for MockCamera {
    async fn start(&mut self, facing: Facing) -> Result<(), CameraError> {
        if self.deny {
            return Err(CameraError::PermissionDenied);
        }
        if facing != Facing::Any && facing != self.facing {
            return Err(CameraError::NoMatchingDevice(facing.to_string()));
        }
        if self.streaming {
            return Err(CameraError::Unavailable("already streaming".to_string()));
        }
        self.streaming = true;
        self.starts += 1;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<CapturedFrame, CameraError> {
        if !self.streaming {
            return Err(CameraError::FrameUnavailable("not streaming".to_string()));
        }
        if self.fail_after.is_some_and(|limit| self.snapshots >= limit) {
            return Err(CameraError::FrameUnavailable("track ended".to_string()));
        }
        self.snapshots += 1;
        Ok(CapturedFrame::new(vec![255; 4 * 4 * 4], 4, 4))
    }

    fn stop(&mut self) {
        self.streaming = false;
        self.stops += 1;
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// OCR adapter that plays back a script of results
pub struct ScriptedOcr {
    script: Mutex<Vec<Result<String, OcrError>>>,
    repeat: Option<Result<String, OcrError>>,
    delay: Option<Duration>,
    panics: bool,
    calls: AtomicU32,
}

impl ScriptedOcr {
    /// Results in order; empty text once the script runs out
    pub fn with_script(script: Vec<Result<String, OcrError>>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            repeat: None,
            delay: None,
            panics: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn repeating(text: &str) -> Self {
        Self {
            repeat: Some(Ok(text.to_string())),
            ..Self::with_script(Vec::new())
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            repeat: Some(Err(OcrError::Engine {
                code: Some(1),
                stderr: message.to_string(),
            })),
            ..Self::with_script(Vec::new())
        }
    }

    /// Every recognition panics
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::with_script(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrAdapter for ScriptedOcr {
    async fn recognize(&self, _frame: &CapturedFrame) -> Result<Recognition, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("recognizer crashed");
        }
        let next = self.script.lock().unwrap().pop();
        let result = next
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| Ok(String::new()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result.map(Recognition::new)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Vehicle lookup backed by a map of known VINs
#[derive(Default)]
pub struct FakeLookup {
    vehicles: HashMap<String, VehicleRecord>,
    calls: Mutex<Vec<String>>,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicle(mut self, vin: &str, make: &str, model: &str, year: i32) -> Self {
        let mut record = VehicleRecord::new(vin).unwrap();
        record.make = Some(make.to_string());
        record.model = Some(model.to_string());
        record.year = Some(year);
        self.vehicles.insert(vin.to_string(), record);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VehicleLookup for FakeLookup {
    async fn lookup(&self, vin: &str) -> Result<VehicleRecord, LookupError> {
        self.calls.lock().unwrap().push(vin.to_string());
        self.vehicles.get(vin).cloned().ok_or_else(|| {
            LookupError::Api(ApiError::Status {
                status: 404,
                detail: Some("Vehicle not found".to_string()),
            })
        })
    }
}

/// A recorded invoice mutation
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceCall {
    Create { customer_id: String, line: LineItemPayload },
    Append { invoice_id: String, line: LineItemPayload },
    Send { invoice_id: String },
}

/// Invoice backend holding at most one invoice per customer for today
pub struct FakeInvoices {
    todays: Mutex<HashMap<String, String>>,
    default_invoice: Option<String>,
    next_id: String,
    reject: Option<String>,
    readback: bool,
    calls: Mutex<Vec<InvoiceCall>>,
    checks: Mutex<Vec<String>>,
}

impl FakeInvoices {
    /// Every customer without an explicit invoice has `existing` today
    pub fn new(existing: Option<&str>) -> Self {
        Self {
            todays: Mutex::new(HashMap::new()),
            default_invoice: existing.map(str::to_string),
            next_id: "INV-1".to_string(),
            reject: None,
            readback: true,
            calls: Mutex::new(Vec::new()),
            checks: Mutex::new(Vec::new()),
        }
    }

    /// Give `customer_id` its own invoice today
    pub fn with_customer_invoice(self, customer_id: &str, invoice_id: &str) -> Self {
        self.todays
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), invoice_id.to_string());
        self
    }

    /// Id returned by the next create
    pub fn creating(mut self, invoice_id: &str) -> Self {
        self.next_id = invoice_id.to_string();
        self
    }

    /// Created invoices stay invisible to `todays_invoice`
    pub fn without_readback(mut self) -> Self {
        self.readback = false;
        self
    }

    /// Reject every mutation with `detail`
    pub fn rejecting(mut self, detail: &str) -> Self {
        self.reject = Some(detail.to_string());
        self
    }

    pub fn calls(&self) -> Vec<InvoiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, InvoiceCall::Create { .. }))
            .count()
    }

    /// Customers whose invoice was queried, in order
    pub fn checks(&self) -> Vec<String> {
        self.checks.lock().unwrap().clone()
    }

    fn rejection(&self) -> Option<InvoiceError> {
        self.reject.as_ref().map(|detail| InvoiceError::Rejected {
            status: 400,
            detail: Some(detail.clone()),
        })
    }
}

#[async_trait]
impl InvoiceBackend for FakeInvoices {
    async fn todays_invoice(&self, customer_id: &str) -> Result<Option<String>, InvoiceError> {
        self.checks.lock().unwrap().push(customer_id.to_string());
        let todays = self.todays.lock().unwrap();
        Ok(todays
            .get(customer_id)
            .cloned()
            .or_else(|| self.default_invoice.clone()))
    }

    async fn create_invoice(&self, customer_id: &str, line: &LineItemPayload) -> Result<String, InvoiceError> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(InvoiceCall::Create {
            customer_id: customer_id.to_string(),
            line: line.clone(),
        });
        if self.readback {
            self.todays
                .lock()
                .unwrap()
                .insert(customer_id.to_string(), self.next_id.clone());
        }
        Ok(self.next_id.clone())
    }

    async fn append_line(&self, invoice_id: &str, line: &LineItemPayload) -> Result<(), InvoiceError> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(InvoiceCall::Append {
            invoice_id: invoice_id.to_string(),
            line: line.clone(),
        });
        Ok(())
    }

    async fn send_invoice(&self, invoice_id: &str) -> Result<SentInvoice, InvoiceError> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(InvoiceCall::Send {
            invoice_id: invoice_id.to_string(),
        });
        Ok(SentInvoice {
            invoice_id: invoice_id.to_string(),
            invoice_number: Some(format!("DOC-{invoice_id}")),
            customer: None,
        })
    }
}

/// A request seen by [`TestBackend`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub csrf_token: Option<String>,
    /// JSON body, `Null` when empty or not JSON
    pub body: Value,
}

impl RecordedRequest {
    /// "METHOD /path"
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

struct BackendState {
    routes: HashMap<String, (StatusCode, Value)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server answering canned JSON per route; anything else is 404
#[derive(Default)]
pub struct TestBackend {
    routes: HashMap<String, (StatusCode, Value)>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `status` and `body`
    pub fn route(mut self, method: &str, path: &str, status: u16, body: Value) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.routes.insert(format!("{method} {path}"), (status, body));
        self
    }

    /// Bind an ephemeral port and serve until the test runtime stops
    pub async fn serve(self) -> RunningBackend {
        let state = Arc::new(BackendState {
            routes: self.routes,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(answer).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve backend") });

        RunningBackend {
            base_url: format!("http://{addr}"),
            state,
        }
    }
}

pub struct RunningBackend {
    pub base_url: String,
    state: Arc<BackendState>,
}

impl RunningBackend {
    /// Client settings pointing at this server; tokens come from its token endpoint
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout_secs: Some(5),
            ..ApiConfig::default()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests other than token fetches
    pub fn api_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path != "/api/csrf/token")
            .collect()
    }
}

async fn answer(
    State(state): State<Arc<BackendState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        csrf_token: headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    let key = request.route();
    state.requests.lock().unwrap().push(request);

    match state.routes.get(&key) {
        Some((status, body)) => (*status, Json(body.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))),
    }
}
