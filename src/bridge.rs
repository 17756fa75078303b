//! JSON command surface.
//!
//! Translates bridge requests (`{"action": "openSerial", "opts": {...}}`) into
//! session calls and session results into responses. Inbound serial data is
//! pushed as separate `data` events on the same outbound channel.
//!
//! Every error response carries both the human-readable message and a stable
//! `kind`, so clients can branch without parsing text.

use crate::discovery::DeviceFilter;
use crate::error::{BridgeError, ErrorKind};
use crate::session::{LifecycleEvent, OpenOptions, ReadListener, SessionHandle};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A bridge request, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "requestPermission")]
    RequestPermission {
        #[serde(default)]
        opts: Option<DeviceFilter>,
    },
    #[serde(rename = "openSerial")]
    Open {
        #[serde(default)]
        opts: Option<Value>,
    },
    #[serde(rename = "writeSerial")]
    Write { data: String },
    #[serde(rename = "writeSerialHex")]
    WriteHex { data: String },
    #[serde(rename = "closeSerial")]
    Close,
    #[serde(rename = "registerReadCallback")]
    RegisterReadCallback,
    #[serde(rename = "pause")]
    Pause,
    #[serde(rename = "resume")]
    Resume,
    #[serde(rename = "destroy")]
    Destroy,
    #[serde(rename = "status")]
    Status,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Self::RequestPermission { .. } => "requestPermission",
            Self::Open { .. } => "openSerial",
            Self::Write { .. } => "writeSerial",
            Self::WriteHex { .. } => "writeSerialHex",
            Self::Close => "closeSerial",
            Self::RegisterReadCallback => "registerReadCallback",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Destroy => "destroy",
            Self::Status => "status",
        }
    }
}

/// Outcome marker of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Single-shot answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            id: None,
            status: ResponseStatus::Ok,
            message: Some(message.into()),
            kind: None,
            data: None,
        }
    }

    pub fn ok_data(data: Value) -> Self {
        Self {
            id: None,
            status: ResponseStatus::Ok,
            message: None,
            kind: None,
            data: Some(data),
        }
    }

    pub fn error(err: &BridgeError) -> Self {
        Self {
            id: None,
            status: ResponseStatus::Error,
            message: Some(err.to_string()),
            kind: Some(err.kind()),
            data: None,
        }
    }

    fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// Inbound bytes pushed to the registered callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEvent {
    /// Always `"data"`.
    pub event: String,
    /// Raw bytes, unmodified.
    pub data: Vec<u8>,
    /// RFC 3339 receive time.
    pub timestamp: String,
}

impl DataEvent {
    pub fn new(data: &[u8]) -> Self {
        Self {
            event: "data".to_string(),
            data: data.to_vec(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Anything the bridge sends back to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Event(DataEvent),
    Response(Response),
}

/// Messages the outbound channel holds before the reader waits for the host.
pub const OUTBOUND_CAPACITY: usize = 64;

/// Bounded channel for everything the bridge sends back to its host.
pub fn outbound_channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

/// Listener that turns inbound bytes into [`DataEvent`]s on the outbound channel.
///
/// A full channel stalls the reader, leaving unread bytes with the device.
struct EventListener {
    tx: mpsc::Sender<Outbound>,
}

impl ReadListener for EventListener {
    fn on_data(&self, data: &[u8]) {
        let _ = self.tx.blocking_send(Outbound::Event(DataEvent::new(data)));
    }
}

/// Dispatches requests to a session worker.
#[derive(Debug, Clone)]
pub struct Bridge {
    session: SessionHandle,
    open_defaults: OpenOptions,
    default_filter: DeviceFilter,
    events: mpsc::Sender<Outbound>,
}

impl Bridge {
    /// Create a bridge whose data events go to `events`.
    pub fn new(session: SessionHandle, events: mpsc::Sender<Outbound>) -> Self {
        Self {
            session,
            open_defaults: OpenOptions::default(),
            default_filter: DeviceFilter::default(),
            events,
        }
    }

    /// Defaults for fields missing from `openSerial` options.
    pub fn with_open_defaults(mut self, defaults: OpenOptions) -> Self {
        self.open_defaults = defaults;
        self
    }

    /// Filter used when `requestPermission` carries no options.
    pub fn with_default_filter(mut self, filter: DeviceFilter) -> Self {
        self.default_filter = filter;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Sender for the channel data events are pushed to.
    pub fn outbound(&self) -> mpsc::Sender<Outbound> {
        self.events.clone()
    }

    /// Parse one JSON request line and execute it.
    ///
    /// Malformed input yields an `invalidArgument` error response; the `id`
    /// is echoed whenever the line was at least a JSON object.
    pub async fn handle_line(&self, line: &str) -> Response {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return Response::error(&BridgeError::from(e)),
        };
        let id = value.get("id").cloned();
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request).await.with_id(id),
            Err(e) => Response::error(&BridgeError::from(e)).with_id(id),
        }
    }

    /// Execute one request.
    pub async fn handle(&self, request: Request) -> Response {
        debug!("Action: {}", request.action());
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => Response::error(&e),
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, BridgeError> {
        match request {
            Request::RequestPermission { opts } => {
                let filter = opts.unwrap_or_else(|| self.default_filter.clone());
                let device = self.session.request_permission(filter).await?;
                Ok(Response {
                    message: Some("Permission granted".to_string()),
                    ..Response::ok_data(serde_json::to_value(device)?)
                })
            }
            Request::Open { opts } => {
                let options = OpenOptions::from_json(opts.as_ref(), &self.open_defaults)?;
                self.session.open(options).await?;
                Ok(Response::ok("Serial port opened!"))
            }
            Request::Write { data } => {
                let written = self.session.write(data.into_bytes()).await?;
                Ok(Response::ok(format!("{written} character written.")))
            }
            Request::WriteHex { data } => {
                let written = self.session.write_hex(data).await?;
                Ok(Response::ok(format!("{written} character written.")))
            }
            Request::Close => {
                self.session.close().await?;
                Ok(Response::ok("Serial port closed!"))
            }
            Request::RegisterReadCallback => {
                let listener: Arc<dyn ReadListener> = Arc::new(EventListener {
                    tx: self.events.clone(),
                });
                self.session.register_read_listener(listener).await?;
                Ok(Response::ok_data(json!({ "registerReadCallback": "true" })))
            }
            Request::Pause => {
                self.session.lifecycle(LifecycleEvent::Background).await?;
                Ok(Response::ok("Session paused"))
            }
            Request::Resume => {
                self.session.lifecycle(LifecycleEvent::Foreground).await?;
                Ok(Response::ok("Session resumed"))
            }
            Request::Destroy => {
                self.session.lifecycle(LifecycleEvent::Teardown).await?;
                Ok(Response::ok("Session destroyed"))
            }
            Request::Status => {
                let status = self.session.status().await?;
                Ok(Response::ok_data(serde_json::to_value(status)?))
            }
        }
    }
}
