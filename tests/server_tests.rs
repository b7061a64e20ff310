//! End-to-end tests for the HTTP transport
//!
//! # Test Coverage
//!
//! - Echo handler over a real `may_minihttp` listener
//! - Route params, query strings and the 404 default
//! - Urlencoded, JSON and multipart bodies decoded from the socket
//! - Hook-driven status codes and response headers
//! - 400 for targets that are not origin-form
//!
//! # Test Fixtures
//!
//! `TestServer` binds both listeners on free ports and stops them on drop.

use anteroom::context::Payload;
use anteroom::decoder::BodyConfig;
use anteroom::echo::echo;
use anteroom::hooks::Hooks;
use anteroom::lifecycle::ShellConfig;
use anteroom::router::RouteTable;
use serde_json::{json, Value};

mod common;
use common::http::{header_value, parse_response, request_with_body, send_request};
use common::multipart::FormBuilder;
use common::test_server::TestServer;

fn echo_server() -> TestServer {
    let mut routes = RouteTable::new();
    routes.insert_handler("/echo", echo());
    TestServer::start(ShellConfig::new(routes))
}

#[test]
fn test_echo_route_params_and_query() {
    let server = echo_server();
    let resp = send_request(
        &server.http_addr(),
        b"GET /echo/1337/remove?sort=desc&q=a+b HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (status, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert_eq!(body["route"], "/echo");
    assert_eq!(body["params"], json!(["1337", "remove"]));
    assert_eq!(body["query"]["sort"], "desc");
    assert_eq!(body["query"]["q"], "a b");
    assert_eq!(body["method"], "GET");
    assert_eq!(body["transport"], "http");
}

#[test]
fn test_unknown_route_is_404() {
    let server = echo_server();
    let resp = send_request(
        &server.http_addr(),
        b"GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (status, body) = parse_response(&resp);
    assert_eq!(status, 404);
    assert_eq!(body, Value::String("Not Found".into()));
}

#[test]
fn test_urlencoded_body() {
    let server = echo_server();
    let req = request_with_body(
        "POST",
        "/echo/form",
        "application/x-www-form-urlencoded",
        b"name=Ada+Lovelace&langs[]=rust&langs[]=c",
    );
    let (status, body) = parse_response(&send_request(&server.http_addr(), &req));
    assert_eq!(status, 200);
    assert_eq!(body["fields"]["name"], "Ada Lovelace");
    assert_eq!(body["fields"]["langs"], json!(["rust", "c"]));
    assert_eq!(body["params"], json!(["form"]));
}

#[test]
fn test_json_body() {
    let server = echo_server();
    let req = request_with_body(
        "PUT",
        "/echo",
        "application/json",
        br#"{"id":7,"tags":["a","b"]}"#,
    );
    let (status, body) = parse_response(&send_request(&server.http_addr(), &req));
    assert_eq!(status, 200);
    assert_eq!(body["json"], json!({"id": 7, "tags": ["a", "b"]}));
}

#[test]
fn test_invalid_json_body_is_500() {
    let server = echo_server();
    let req = request_with_body("POST", "/echo", "application/json", b"{oops");
    let (status, _) = parse_response(&send_request(&server.http_addr(), &req));
    assert_eq!(status, 500);
}

#[test]
fn test_multipart_upload() {
    let dir = tempfile::tempdir().unwrap();
    let routes = RouteTable::new().route("/upload", |ctx| {
        let file = ctx.file("doc").ok_or_else(|| anyhow::anyhow!("no upload"))?;
        let contents = std::fs::read(&file.temp_path)?;
        file.remove()?;
        Ok(Payload::Json(json!({
            "title": ctx.field("title").and_then(|f| f.as_str()),
            "file_name": file.file_name,
            "mime_type": file.mime_type,
            "size": file.size,
            "sum": contents.iter().map(|b| u64::from(*b)).sum::<u64>(),
        })))
    });
    let config = ShellConfig::new(routes).with_body_config(BodyConfig {
        upload_dir: dir.path().to_path_buf(),
        ..BodyConfig::default()
    });
    let server = TestServer::start(config);

    let data: Vec<u8> = (0..=255u8).cycle().take(30_000).collect();
    let form = FormBuilder::new("----e2eBoundary")
        .text("title", "Spec sheet")
        .file("doc", "sheet.csv", "text/csv", &data);
    let content_type = form.content_type();
    let req = request_with_body("POST", "/upload", &content_type, &form.build());

    let (status, body) = parse_response(&send_request(&server.http_addr(), &req));
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["title"], "Spec sheet");
    assert_eq!(body["file_name"], "sheet.csv");
    assert_eq!(body["mime_type"], "text/csv");
    assert_eq!(body["size"], 30_000);
    assert_eq!(
        body["sum"],
        data.iter().map(|b| u64::from(*b)).sum::<u64>()
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_hooks_shape_http_response() {
    let hooks = Hooks::new()
        .before_endpoint(|ctx| {
            if ctx.cookie("session").is_none() {
                ctx.set_status(401);
                ctx.response.payload = Payload::Json(json!({ "error": "login required" }));
                return Ok(false);
            }
            Ok(true)
        })
        .before_send(|ctx| {
            ctx.set_header("X-Unit-Id", ctx.unit_id.to_string());
            Ok(())
        });
    let mut routes = RouteTable::new();
    routes.insert_handler("/echo", echo());
    let server = TestServer::start(ShellConfig::new(routes).with_hooks(hooks));

    let resp = send_request(
        &server.http_addr(),
        b"GET /echo HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (status, body) = parse_response(&resp);
    assert_eq!(status, 401);
    assert_eq!(body["error"], "login required");
    assert!(header_value(&resp, "x-unit-id").is_some());

    let resp = send_request(
        &server.http_addr(),
        b"GET /echo HTTP/1.1\r\nHost: localhost\r\nCookie: theme=dark; session=abc\r\nX-Request-Id: 01ARZ3NDEKTSV4RRFFQ69G5FAV\r\n\r\n",
    );
    let (status, body) = parse_response(&resp);
    assert_eq!(status, 200);
    assert_eq!(body["unit_id"], "01ARZ3NDEKTSV4RRFFQ69G5FAV");
    assert_eq!(
        header_value(&resp, "x-unit-id").as_deref(),
        Some("01ARZ3NDEKTSV4RRFFQ69G5FAV")
    );
}

#[test]
fn test_handler_failure_is_500_and_server_keeps_serving() {
    let routes = RouteTable::new()
        .route("/panic", |_| panic!("handler bug"))
        .route("/ok", |_| Ok(Payload::from("fine")));
    let server = TestServer::start(ShellConfig::new(routes));

    let (status, body) = parse_response(&send_request(
        &server.http_addr(),
        b"GET /panic HTTP/1.1\r\nHost: localhost\r\n\r\n",
    ));
    assert_eq!(status, 500);
    assert_eq!(body, Value::String("Internal Server Error".into()));

    let (status, body) = parse_response(&send_request(
        &server.http_addr(),
        b"GET /ok HTTP/1.1\r\nHost: localhost\r\n\r\n",
    ));
    assert_eq!(status, 200);
    assert_eq!(body, Value::String("fine".into()));
}

#[test]
fn test_asterisk_target_is_bad_request() {
    let server = echo_server();
    let resp = send_request(
        &server.http_addr(),
        b"OPTIONS * HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let (status, body) = parse_response(&resp);
    assert_eq!(status, 400);
    assert_eq!(body, Value::String("Bad Request".into()));
}
