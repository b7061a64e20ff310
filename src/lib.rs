//! # anteroom
//!
//! **anteroom** is a minimal, coroutine-powered application-server shell. It accepts HTTP
//! requests and persistent WebSocket messages, resolves them against a table of hierarchical
//! path prefixes, streams request bodies into form fields, JSON and files on disk, and runs every
//! unit of work through one fixed lifecycle of hooks.
//!
//! ## Overview
//!
//! A *unit* is one HTTP request or one inbound socket message. Both transports build a
//! [`RequestContext`] and hand it to the same [`Lifecycle`], so routing, body decoding, hooks and
//! failure handling behave identically; only the final rendering differs (an HTTP response vs a
//! single outbound frame).
//!
//! ## Architecture
//!
//! - **[`router`]** - Prefix route table: the longest registered prefix wins, the remainder
//!   becomes positional parameters
//! - **[`scanner`]** - Growable byte buffer with delimiter search shared by the decoders
//! - **[`decoder`]** - Streaming urlencoded, multipart and JSON body decoders
//! - **[`context`]** - Per-unit state: request data, decoded body, session and response
//! - **[`hooks`]** - User hook slots, one per lifecycle stage
//! - **[`lifecycle`]** - The fixed phase ordering, panic recovery and exactly-once send
//! - **[`events`]** - Ordered typed observers, used for lifecycle notifications
//! - **[`server`]** - `may_minihttp` HTTP adapter and `tungstenite` socket adapter
//! - **[`config`]** / **[`logging`]** - Environment configuration and `tracing` setup
//!
//! ### Unit Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Adapter as server::ShellService /<br/>server::SocketServer
//!     participant Life as lifecycle::Lifecycle
//!     participant Router as router::RouteTable
//!     participant Decoder as decoder::BodyDecoder
//!     participant Handler
//!
//!     Client->>Adapter: request / message
//!     Adapter->>Life: run(ctx, body, sink)
//!     Life->>Life: on_arrival hook
//!     Life->>Router: resolve(path)
//!     Router-->>Life: RouteMatch { route, params, handler }
//!     Life->>Decoder: feed(chunk) ... finish()
//!     Decoder-->>Life: fields, files, json
//!     Life->>Life: before_endpoint gate
//!     Life->>Handler: exec hook / handler(ctx)
//!     Handler-->>Life: Payload
//!     Life->>Life: before_send hook
//!     Life->>Adapter: sink.send(ctx) (exactly once)
//!     Adapter-->>Client: response / frame
//! ```
//!
//! Any hook or handler failure, including a panic, diverts to the error hook and then to a
//! fixed `500` fallback; the unit is still answered exactly once.
//!
//! ## Quick Start
//!
//! ```no_run
//! use anteroom::context::Payload;
//! use anteroom::lifecycle::{Lifecycle, ShellConfig};
//! use anteroom::router::RouteTable;
//! use anteroom::server::{HttpServer, ShellService};
//!
//! let routes = RouteTable::new().route("/hello", |ctx| {
//!     let name = ctx.param(0).unwrap_or("world").to_string();
//!     Ok(Payload::Text(format!("hello {name}")))
//! });
//! let lifecycle = Lifecycle::new(ShellConfig::new(routes));
//! let handle = HttpServer(ShellService::new(lifecycle))
//!     .start("127.0.0.1:3000")
//!     .expect("bind");
//! handle.join().ok();
//! ```
//!
//! ## Runtime Considerations
//!
//! anteroom uses the `may` coroutine runtime, not tokio:
//!
//! - Every connection is served by its own coroutine
//! - Stack size is configurable via `ANTEROOM_STACK_SIZE`
//! - Handlers may block; `may` parks the coroutine, not the worker thread
//! - Handler panics are caught per unit; the release profile must keep `panic = "unwind"`

pub mod cli;
pub mod config;
pub mod context;
pub mod decoder;
pub mod echo;
pub mod error;
pub mod events;
pub mod hooks;
pub mod ids;
pub mod lifecycle;
pub mod logging;
pub mod router;
pub mod scanner;
pub mod server;

pub use context::{Payload, RequestContext};
pub use error::{ShellError, Stage};
pub use hooks::Hooks;
pub use lifecycle::{Lifecycle, ShellConfig};
pub use router::RouteTable;
