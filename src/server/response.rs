use crate::context::{reason_phrase, Payload, Response as UnitResponse};
use http::StatusCode;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Distinct custom header lines kept for the life of the process.
pub const MAX_HEADER_LINES: usize = 4096;

// may_minihttp only accepts &'static str header lines, so each distinct line
// is leaked once and reused afterwards.
static HEADER_LINES: Lazy<Mutex<HashSet<&'static str>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn intern_header(line: String) -> Option<&'static str> {
    let mut lines = HEADER_LINES.lock().unwrap_or_else(PoisonError::into_inner);
    intern_in(&mut lines, line, MAX_HEADER_LINES)
}

fn intern_in(lines: &mut HashSet<&'static str>, line: String, limit: usize) -> Option<&'static str> {
    if let Some(existing) = lines.get(line.as_str()) {
        return Some(*existing);
    }
    if lines.len() >= limit {
        return None;
    }
    let leaked: &'static str = Box::leak(line.into_boxed_str());
    lines.insert(leaked);
    Some(leaked)
}

/// Static `Content-Type` header line implied by a payload.
fn content_type_header(payload: &Payload) -> Option<&'static str> {
    match payload {
        Payload::Empty => None,
        Payload::Text(_) => Some("Content-Type: text/plain; charset=utf-8"),
        Payload::Bytes(_) => Some("Content-Type: application/octet-stream"),
        Payload::Json(_) => Some("Content-Type: application/json"),
    }
}

/// `Name: value` with CR/LF removed so a header cannot split the response.
fn header_line(name: &str, value: &str) -> String {
    let clean = |s: &str| s.chars().filter(|c| *c != '\r' && *c != '\n').collect::<String>();
    format!("{}: {}", clean(name), clean(value))
}

/// Write a unit's response into the `may_minihttp` response buffer.
///
/// Explicit headers win over the payload's implied content type.
/// `Content-Length` is always computed by the server.
pub fn write_response(res: &mut Response, response: UnitResponse) {
    let status = response.status;
    res.status_code(status.as_u16() as usize, reason_phrase(status));

    let mut has_content_type = false;
    for (name, value) in &response.headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        match intern_header(header_line(name, value)) {
            Some(line) => {
                has_content_type |= name.eq_ignore_ascii_case("content-type");
                res.header(line);
            }
            None => warn!(
                header = %name,
                limit = MAX_HEADER_LINES,
                "Header line table full, dropping header"
            ),
        }
    }
    if !has_content_type {
        if let Some(header) = content_type_header(&response.payload) {
            res.header(header);
        }
    }
    res.body_vec(response.payload.into_bytes());
}

/// 400 for requests rejected before a context exists.
pub fn write_bad_request(res: &mut Response) {
    let status = StatusCode::BAD_REQUEST;
    res.status_code(status.as_u16() as usize, reason_phrase(status));
    res.header("Content-Type: text/plain; charset=utf-8");
    res.body_vec(reason_phrase(status).as_bytes().to_vec());
}
