#![allow(dead_code)]

pub mod test_server {
    use anteroom::lifecycle::{Lifecycle, ShellConfig};
    use anteroom::server::{HttpServer, ServerHandle, ShellService, SocketServer};
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Install a test-writer subscriber; later calls are no-ops.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    /// Reserve a free local port. may_minihttp cannot report the port it bound.
    pub fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    /// Both listeners over one lifecycle, stopped on drop.
    pub struct TestServer {
        http: Option<ServerHandle>,
        socket: Option<ServerHandle>,
        http_addr: SocketAddr,
        ws_addr: SocketAddr,
    }

    impl TestServer {
        pub fn start(config: ShellConfig) -> Self {
            setup_may_runtime();
            init_tracing();
            let lifecycle = Lifecycle::new(config);

            let socket = SocketServer::new(lifecycle.clone())
                .start("127.0.0.1:0")
                .unwrap();
            let ws_addr = socket.addr();

            let http_addr = free_addr();
            let http = HttpServer(ShellService::new(lifecycle))
                .start(http_addr)
                .unwrap();
            http.wait_ready().unwrap();
            socket.wait_ready().unwrap();

            Self {
                http: Some(http),
                socket: Some(socket),
                http_addr,
                ws_addr,
            }
        }

        pub fn http_addr(&self) -> SocketAddr {
            self.http_addr
        }

        pub fn ws_url(&self) -> String {
            format!("ws://{}/", self.ws_addr)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.http.take() {
                handle.stop();
            }
            if let Some(handle) = self.socket.take() {
                handle.stop();
            }
        }
    }
}

pub mod http {
    use serde_json::Value;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Write a raw request and read one response, stopping at `Content-Length`.
    pub fn send_request(addr: &SocketAddr, req: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(2000)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            if response_complete(&buf) {
                break;
            }
            let mut tmp = [0u8; 4096];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn response_complete(buf: &[u8]) -> bool {
        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]);
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= head_end + 4 + length
    }

    /// Build a request with a body and the matching `Content-Length`.
    pub fn request_with_body(method: &str, target: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut req = format!(
            "{method} {target} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        req.extend_from_slice(body);
        req
    }

    pub fn parse_response_parts(resp: &str) -> (u16, String, String) {
        let mut parts = resp.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("").to_string();
        let mut status = 0;
        let mut content_type = String::new();
        for line in headers.lines() {
            if line.starts_with("HTTP/1.1") {
                status = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("0")
                    .parse()
                    .unwrap();
            } else if let Some((name, val)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-type") {
                    content_type = val.trim().to_string();
                }
            }
        }
        (status, content_type, body)
    }

    pub fn parse_response(resp: &str) -> (u16, Value) {
        let (status, content_type, body) = parse_response_parts(resp);
        if content_type.starts_with("application/json") {
            let json: Value = serde_json::from_str(&body).unwrap_or_default();
            (status, json)
        } else {
            (status, Value::String(body))
        }
    }

    pub fn header_value(resp: &str, name: &str) -> Option<String> {
        let head = resp.split("\r\n\r\n").next()?;
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string())
    }
}

pub mod multipart {
    /// Builds `multipart/form-data` bodies.
    pub struct FormBuilder {
        boundary: String,
        body: Vec<u8>,
    }

    impl FormBuilder {
        pub fn new(boundary: &str) -> Self {
            Self {
                boundary: boundary.to_string(),
                body: Vec::new(),
            }
        }

        pub fn content_type(&self) -> String {
            format!("multipart/form-data; boundary={}", self.boundary)
        }

        pub fn text(mut self, name: &str, value: &str) -> Self {
            self.body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n",
                    self.boundary
                )
                .as_bytes(),
            );
            self.body.extend_from_slice(value.as_bytes());
            self.body.extend_from_slice(b"\r\n");
            self
        }

        pub fn file(mut self, name: &str, file_name: &str, mime: &str, data: &[u8]) -> Self {
            self.body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n",
                    self.boundary
                )
                .as_bytes(),
            );
            self.body.extend_from_slice(data);
            self.body.extend_from_slice(b"\r\n");
            self
        }

        /// Body with the closing delimiter.
        pub fn build(mut self) -> Vec<u8> {
            self.body
                .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
            self.body
        }

        /// Body cut off before the closing delimiter.
        pub fn build_unterminated(self) -> Vec<u8> {
            self.body
        }
    }
}

pub mod sinks {
    use anteroom::context::{Payload, RequestContext, Response};
    use anteroom::lifecycle::{BodySource, ResponseSink};
    use bytes::Bytes;
    use std::io;

    /// Records every write so tests can count them.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Vec<Response>,
        pub skipped: usize,
        pub frames: Vec<Payload>,
    }

    impl RecordingSink {
        pub fn only(&self) -> &Response {
            assert_eq!(self.sent.len(), 1, "expected exactly one response");
            &self.sent[0]
        }
    }

    impl ResponseSink for RecordingSink {
        fn send(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
            self.frames.extend(ctx.drain_outbox());
            self.sent.push(std::mem::take(&mut ctx.response));
            Ok(())
        }

        fn skip(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
            self.frames.extend(ctx.drain_outbox());
            self.skipped += 1;
            Ok(())
        }
    }

    /// Yields `good` chunks, then a connection reset.
    pub struct FailingBody {
        pub good: Vec<Bytes>,
    }

    impl BodySource for FailingBody {
        fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
            if self.good.is_empty() {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
            }
            Ok(Some(self.good.remove(0)))
        }
    }
}
