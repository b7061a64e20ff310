//! Persistent message-socket transport.
//!
//! Each accepted connection is upgraded with `tungstenite` and served by its
//! own `may` coroutine. Every text or binary frame must hold one JSON object;
//! its `endpoint` field is the path to route. Messages on a connection are
//! processed one after another through the same [`Lifecycle`] as HTTP units,
//! and each produces exactly one outbound frame (plus any frames the handler
//! queued with [`RequestContext::push`]).

use super::http_server::ServerHandle;
use super::request::parse_query_params;
use crate::context::{failure_envelope, Payload, RequestContext, Session};
use crate::error::Stage;
use crate::lifecycle::{Lifecycle, NoBody, ResponseSink};
use http::StatusCode;
use may::net::{TcpListener, TcpStream};
use serde::de::Error as _;
use serde_json::Value;
use std::io;
use std::net::ToSocketAddrs;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};
use tungstenite::{Message, WebSocket};

/// Field of a socket message naming the route.
pub const ENDPOINT_FIELD: &str = "endpoint";

/// Listener for the persistent-socket transport.
pub struct SocketServer {
    lifecycle: Lifecycle,
}

impl SocketServer {
    #[must_use]
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }

    /// Bind `addr` and start accepting connections.
    ///
    /// Port `0` picks a free port; read it back from [`ServerHandle::addr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        let lifecycle = self.lifecycle;
        let handle = may::go!(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let lifecycle = lifecycle.clone();
                        may::go!(move || serve_connection(&lifecycle, stream));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept socket connection"),
                }
            }
        });
        info!(addr = %addr, "Socket listener started");
        Ok(ServerHandle::new(addr, handle))
    }
}

fn serve_connection(lifecycle: &Lifecycle, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let mut socket = match tungstenite::accept(stream) {
        Ok(socket) => socket,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Socket handshake failed");
            return;
        }
    };

    let session = Session::new();
    if let Some(hook) = &lifecycle.config().hooks.on_connect {
        let result = panic::catch_unwind(AssertUnwindSafe(|| hook(&session)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("panicked")));
        if let Err(e) = result {
            error!(peer = %peer, stage = %Stage::Connect, error = %e, "Connect hook failed, closing");
            let mut sink = SocketSink::new(&mut socket);
            if let Err(e) = sink.write(Payload::Json(failure_envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
            ))) {
                debug!(peer = %peer, error = %e, "Failed to send connect failure");
            }
            if let Err(e) = socket.close(None) {
                debug!(peer = %peer, error = %e, "Failed to close socket");
            }
            return;
        }
    }
    info!(peer = %peer, "Socket connected");

    loop {
        let frame = match socket.read() {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Socket read failed");
                break;
            }
        };

        let mut sink = SocketSink::new(&mut socket);
        match message_context(&frame, &session) {
            Ok(ctx) => {
                lifecycle.run(ctx, &mut NoBody, &mut sink);
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Rejected socket message");
                if let Err(e) = sink.write(Payload::Json(failure_envelope(StatusCode::BAD_REQUEST)))
                {
                    debug!(peer = %peer, error = %e, "Failed to send rejection");
                }
            }
        }
        if sink.closed {
            break;
        }
    }
    info!(peer = %peer, "Socket disconnected");
}

/// Build the context for one socket message.
///
/// # Errors
///
/// Returns the parse error when the frame is not JSON, or an error when it
/// holds some other JSON value than an object.
pub fn message_context(frame: &[u8], session: &Session) -> Result<RequestContext, serde_json::Error> {
    let message: Value = serde_json::from_slice(frame)?;
    if !message.is_object() {
        return Err(serde_json::Error::custom("socket message must be a JSON object"));
    }
    let endpoint = message
        .get(ENDPOINT_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let query = parse_query_params(&endpoint);
    Ok(RequestContext::socket(endpoint, message, session.clone()).with_query(query))
}

struct SocketSink<'a> {
    socket: &'a mut WebSocket<TcpStream>,
    closed: bool,
}

impl<'a> SocketSink<'a> {
    fn new(socket: &'a mut WebSocket<TcpStream>) -> Self {
        Self {
            socket,
            closed: false,
        }
    }

    fn write(&mut self, payload: Payload) -> io::Result<()> {
        let message = match payload {
            Payload::Empty => Message::Text(String::new()),
            Payload::Text(text) => Message::Text(text),
            Payload::Json(value) => Message::Text(value.to_string()),
            Payload::Bytes(data) => Message::Binary(data),
        };
        self.socket.send(message).map_err(|e| {
            self.closed = true;
            match e {
                tungstenite::Error::Io(e) => e,
                other => io::Error::new(io::ErrorKind::Other, other),
            }
        })
    }

    fn flush_outbox(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
        for payload in ctx.drain_outbox() {
            self.write(payload)?;
        }
        Ok(())
    }
}

impl ResponseSink for SocketSink<'_> {
    fn send(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
        self.flush_outbox(ctx)?;
        self.write(std::mem::take(&mut ctx.response.payload))
    }

    fn skip(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
        self.flush_outbox(ctx)
    }
}
