use crate::context::RequestContext;
use may_minihttp::Request;
use std::collections::HashMap;
use tracing::debug;

/// Method, target and headers read from a `may_minihttp::Request` before its body is taken.
#[derive(Debug, PartialEq)]
pub struct RequestHead {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request target including query string
    pub target: String,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    pub fn read(req: &Request) -> Self {
        let method = req.method().to_string();
        let target = req.path().to_string();

        // R3: Headers extracted
        let headers: HashMap<String, String> = req
            .headers()
            .iter()
            .map(|h| {
                (
                    h.name.to_ascii_lowercase(),
                    String::from_utf8_lossy(h.value).to_string(),
                )
            })
            .collect();

        debug!(
            method = %method,
            target = %target,
            header_count = headers.len(),
            header_names = ?headers.keys().take(20).collect::<Vec<_>>(),
            "Request head read"
        );

        Self {
            method,
            target,
            headers,
        }
    }

    /// Build the unit's context.
    ///
    /// # Returns
    ///
    /// `None` when the target is not origin-form (does not begin with `/`);
    /// such requests are answered with 400 before any hook runs.
    #[must_use]
    pub fn into_context(self) -> Option<RequestContext> {
        if !self.target.starts_with('/') {
            return None;
        }
        let query = parse_query_params(&self.target);
        // R4: Query params parsed
        debug!(param_count = query.len(), "Query params parsed");
        Some(
            RequestContext::http(self.method, self.target)
                .with_headers(self.headers)
                .with_query(query),
        )
    }
}

/// Parse query string parameters from a request target
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
///
/// # Arguments
///
/// * `target` - The request target (e.g., `/users?limit=10&offset=20`)
///
/// # Returns
///
/// A map of query parameter names to values (last occurrence wins)
#[must_use]
pub fn parse_query_params(target: &str) -> HashMap<String, String> {
    match target.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => HashMap::new(),
    }
}
