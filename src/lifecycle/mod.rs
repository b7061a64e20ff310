//! # Lifecycle Module
//!
//! The lifecycle drives one [`RequestContext`](crate::context::RequestContext)
//! through a fixed sequence of phases and guarantees that exactly one response
//! is handed to the transport, whatever fails along the way.
//!
//! ## Phases
//!
//! ```text
//! Arrived ─▶ PreHook ─▶ Routing ─▶ BodyDecode ─▶ GateHook ─▶ Exec ─▶ PostHook ─▶ Responded
//!               │          │ no match                │ false         ▲
//!               │          └──────── 404 / on_not_found ──────────────┤
//!               │ run_routing = false ────────────────────────────────┤
//!               └──── any failure up to Exec ─▶ Error ────────────────┘
//! ```
//!
//! - **PreHook**: `on_arrival` may mutate the context, force a route or
//!   disable routing entirely.
//! - **Routing**: the forced route (if any) or the path is resolved; the
//!   matched route and parameters are written to the context.
//! - **BodyDecode**: only for matched routes. Chunks are pulled from the
//!   [`BodySource`] one at a time and each is applied before the next is read,
//!   so decoding completes exactly when end of input has been seen.
//! - **GateHook**: `before_endpoint` returning `false` skips execution.
//! - **Exec**: the `exec` hook wraps the handler, or the handler runs directly
//!   and its payload becomes the response.
//! - **Error**: `custom_response_written` is cleared and `on_error` renders the
//!   failure; if it is missing or fails, the response is reset to the
//!   transport's 500 rendering with no extra headers.
//! - **PostHook**: `before_send` sees the final response and may replace it.
//! - **Responded**: the [`ResponseSink`] is called once, unless the context
//!   reports `custom_response_written`.
//!
//! Hooks and handlers run under `catch_unwind`; a panic fails the unit like
//! an `Err` would and never takes down the connection coroutine.
//!
//! ## Example
//!
//! ```rust
//! use anteroom::context::{Payload, RequestContext};
//! use anteroom::lifecycle::{Lifecycle, NoBody, ShellConfig, ResponseSink};
//! use anteroom::router::RouteTable;
//! use std::io;
//!
//! struct Capture(Vec<Payload>);
//!
//! impl ResponseSink for Capture {
//!     fn send(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
//!         self.0.push(ctx.response.payload.clone());
//!         Ok(())
//!     }
//! }
//!
//! let routes = RouteTable::new().route("/hello", |_| Ok("hi".into()));
//! let lifecycle = Lifecycle::new(ShellConfig::new(routes));
//! let mut sink = Capture(Vec::new());
//! let outcome = lifecycle.run(RequestContext::http("GET", "/hello"), &mut NoBody, &mut sink);
//! assert!(outcome.written);
//! assert_eq!(sink.0, vec![Payload::from("hi")]);
//! ```

mod core;

pub use core::{
    BodySource, ChunkedBody, Lifecycle, NoBody, Outcome, Phase, ReadBody, ResponseSink,
    ShellConfig, READ_CHUNK_SIZE,
};
