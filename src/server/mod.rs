//! Transport adapters: HTTP via `may_minihttp` and persistent sockets via
//! `tungstenite`, both feeding the shared [`Lifecycle`](crate::lifecycle::Lifecycle).

mod http_server;
mod request;
mod response;
mod service;
mod socket;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_query_params, RequestHead};
pub use response::{write_bad_request, write_response, MAX_HEADER_LINES};
pub use service::ShellService;
pub use socket::{message_context, SocketServer, ENDPOINT_FIELD};
