//! Per-unit request state.
//!
//! A [`RequestContext`] is created by a transport adapter when a request or
//! socket message arrives, travels once through the [`Lifecycle`], and is
//! dropped after the response has been written. Hooks and handlers receive it
//! mutably: they read the decoded fields, files and JSON body, and they shape
//! the [`Response`] and the control flags that steer the remaining phases.
//!
//! [`Lifecycle`]: crate::lifecycle::Lifecycle

use crate::decoder::DecodedBody;
use crate::ids::UnitId;
use crate::router::ParamVec;
use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Decoded form fields keyed by name (array fields without their `[]` suffix).
pub type Fields = HashMap<String, FieldValue>;

/// Uploaded files keyed by field name, in arrival order.
pub type Files = HashMap<String, Vec<UploadedFile>>;

/// Which adapter produced the unit; decides how failures are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Socket,
}

/// A decoded form value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Plain `name=value`; a later occurrence overwrites an earlier one
    Text(String),
    /// Values collected from `name[]=…` occurrences
    List(Vec<String>),
}

impl FieldValue {
    /// The scalar value, or the last element of a list.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(items) => items.last().map(String::as_str),
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            FieldValue::Text(_) => None,
        }
    }
}

/// A file part streamed to disk by the multipart decoder.
///
/// The temporary file is left in place once the unit completes; the handler
/// relocates it with [`UploadedFile::persist_to`] or deletes it with
/// [`UploadedFile::remove`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub mime_type: String,
    /// Lowercase extension including the dot (`.png`), empty when the name has none
    pub extension: String,
    pub size: u64,
    pub temp_path: PathBuf,
}

impl UploadedFile {
    /// Move the upload to `dest`, copying across filesystems when a rename is refused.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when neither rename nor copy succeeds.
    pub fn persist_to(&self, dest: impl AsRef<Path>) -> io::Result<()> {
        let dest = dest.as_ref();
        if fs::rename(&self.temp_path, dest).is_ok() {
            return Ok(());
        }
        fs::copy(&self.temp_path, dest)?;
        fs::remove_file(&self.temp_path)
    }

    /// Delete the temporary file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error (including `NotFound` if already moved).
    pub fn remove(&self) -> io::Result<()> {
        fs::remove_file(&self.temp_path)
    }
}

/// Response body produced by a handler or hook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Payload {
    /// Content type implied by the payload variant.
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Payload::Empty => None,
            Payload::Text(_) => Some("text/plain; charset=utf-8"),
            Payload::Bytes(_) => Some("application/octet-stream"),
            Payload::Json(_) => Some("application/json"),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Serialize the payload into wire bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Empty => Vec::new(),
            Payload::Text(s) => s.into_bytes(),
            Payload::Bytes(b) => b,
            Payload::Json(v) => v.to_string().into_bytes(),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

/// Outbound response accumulated on the context and written once.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            payload: Payload::Empty,
        }
    }
}

impl Response {
    /// Value of a response header (case-insensitive name).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Per-connection key/value state.
///
/// Socket connections keep one session for their whole life: whatever the
/// `on_connect` hook or an earlier message stored is visible to every later
/// message on the same connection. HTTP units get a fresh, empty session.
#[derive(Debug, Clone, Default)]
pub struct Session(Arc<Mutex<Map<String, Value>>>);

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

/// Everything known about one inbound unit.
#[derive(Debug)]
pub struct RequestContext {
    pub unit_id: UnitId,
    pub transport: Transport,
    /// HTTP method; `None` for socket messages
    pub method: Option<String>,
    /// Raw target (HTTP request target or socket `endpoint`)
    pub target: String,
    /// Path component of the target, without the query string
    pub path: String,
    /// Route to resolve instead of `path` when set before routing; the matched route afterwards
    pub route: Option<String>,
    /// Segments stripped from the path during prefix matching, in order
    pub params: ParamVec,
    pub query: HashMap<String, String>,
    /// Request headers with lowercase names
    pub headers: HashMap<String, String>,
    pub fields: Fields,
    pub files: Files,
    pub json: Option<Value>,
    pub session: Session,
    pub response: Response,
    /// Cleared by a pre-hook to skip routing, decoding and execution
    pub run_routing: bool,
    /// Cleared to skip the `before_send` hook
    pub run_post_hook: bool,
    /// Set when a hook or handler already produced the outbound response itself.
    ///
    /// The socket transport still flushes frames queued with [`push`](Self::push).
    /// Over HTTP hooks cannot reach the raw connection, so `may_minihttp` sends
    /// its default empty `200 OK`.
    pub custom_response_written: bool,
    outbox: Vec<Payload>,
    cookies: OnceCell<HashMap<String, String>>,
    arrived_at: Instant,
}

impl RequestContext {
    #[must_use]
    pub fn new(transport: Transport, target: impl Into<String>) -> Self {
        let target = target.into();
        let path = target.split('?').next().unwrap_or_default().to_owned();
        Self {
            unit_id: UnitId::new(),
            transport,
            method: None,
            target,
            path,
            route: None,
            params: ParamVec::new(),
            query: HashMap::new(),
            headers: HashMap::new(),
            fields: Fields::new(),
            files: Files::new(),
            json: None,
            session: Session::new(),
            response: Response::default(),
            run_routing: true,
            run_post_hook: true,
            custom_response_written: false,
            outbox: Vec::new(),
            cookies: OnceCell::new(),
            arrived_at: Instant::now(),
        }
    }

    /// HTTP unit for `method` and the raw request target.
    #[must_use]
    pub fn http(method: impl Into<String>, target: impl Into<String>) -> Self {
        let mut ctx = Self::new(Transport::Http, target);
        ctx.method = Some(method.into());
        ctx
    }

    /// Socket unit addressed to `endpoint` carrying the decoded message.
    #[must_use]
    pub fn socket(endpoint: impl Into<String>, message: Value, session: Session) -> Self {
        let mut ctx = Self::new(Transport::Socket, endpoint);
        ctx.json = Some(message);
        ctx.session = session;
        ctx
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.unit_id = UnitId::from_header_or_new(headers.get("x-request-id").map(String::as_str));
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Cookies from the `Cookie` header, parsed on first access.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies
            .get_or_init(|| parse_cookie_header(self.header("cookie").unwrap_or_default()))
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).and_then(|files| files.first())
    }

    /// Route parameter by position.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Set the response status from a numeric code; invalid codes become 500.
    pub fn set_status(&mut self, code: u16) {
        self.response.status =
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// Set (or replace) a response header.
    ///
    /// Over HTTP every distinct `name: value` line is retained for the life of
    /// the process, up to [`MAX_HEADER_LINES`](crate::server::MAX_HEADER_LINES);
    /// new lines past that limit are dropped with a warning. Per-unit values
    /// such as session cookies count against it.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.response
            .headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.response.headers.push((name, value.into()));
    }

    /// Replace the response with the transport's failure rendering of `status`.
    ///
    /// HTTP gets the canonical reason phrase as a text body; sockets get
    /// `{"status":"FAIL","code":…,"message":…}`.
    pub fn fail(&mut self, status: StatusCode) {
        self.response.status = status;
        self.response.payload = match self.transport {
            Transport::Http => Payload::Text(reason_phrase(status).to_owned()),
            Transport::Socket => Payload::Json(failure_envelope(status)),
        };
    }

    /// Queue an extra outbound frame ahead of the response (socket transport only).
    pub fn push(&mut self, payload: impl Into<Payload>) {
        self.outbox.push(payload.into());
    }

    /// Frames queued with [`RequestContext::push`], in order.
    pub fn drain_outbox(&mut self) -> Vec<Payload> {
        std::mem::take(&mut self.outbox)
    }

    /// Merge a decoded body into the context; an existing JSON body is kept when the decoder produced none.
    pub fn absorb(&mut self, body: DecodedBody) {
        self.fields.extend(body.fields);
        for (name, files) in body.files {
            self.files.entry(name).or_default().extend(files);
        }
        if body.json.is_some() {
            self.json = body.json;
        }
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.arrived_at.elapsed().as_millis()
    }
}

/// Canonical reason phrase, or the 500 phrase for unregistered codes.
#[must_use]
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Internal Server Error")
}

/// Socket failure frame: `{"status":"FAIL","code":…,"message":…}`.
#[must_use]
pub fn failure_envelope(status: StatusCode) -> Value {
    json!({
        "status": "FAIL",
        "code": status.as_u16(),
        "message": reason_phrase(status),
    })
}

/// Parse a `Cookie` header into name/value pairs.
#[must_use]
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}
