use crate::context::{Payload, RequestContext};
use crate::router::Handler;
use serde_json::json;
use std::sync::Arc;

/// Reflect everything the shell decoded about the unit back to the caller.
///
/// Used by the `serve` command as its only route and by the end-to-end tests.
///
/// # Errors
///
/// Never fails; the signature matches [`Handler`].
pub fn echo_handler(ctx: &mut RequestContext) -> anyhow::Result<Payload> {
    Ok(Payload::Json(json!({
        "unit_id": ctx.unit_id,
        "transport": ctx.transport,
        "method": ctx.method,
        "path": ctx.path,
        "route": ctx.route,
        "params": ctx.params.as_slice(),
        "query": ctx.query,
        "fields": ctx.fields,
        "files": ctx.files,
        "json": ctx.json,
    })))
}

/// [`echo_handler`] wrapped for registration in a [`RouteTable`](crate::router::RouteTable).
#[must_use]
pub fn echo() -> Handler {
    Arc::new(echo_handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_echo_reflects_params_and_query() {
        let mut ctx = RequestContext::http("GET", "/users/42?sort=asc");
        ctx.route = Some("/users".into());
        ctx.params.push("42".into());
        ctx.query.insert("sort".into(), "asc".into());

        let Payload::Json(body) = echo_handler(&mut ctx).unwrap() else {
            panic!("expected JSON payload");
        };
        assert_eq!(body["route"], "/users");
        assert_eq!(body["params"], json!(["42"]));
        assert_eq!(body["query"]["sort"], "asc");
        assert_eq!(body["transport"], "http");
        assert_eq!(body["json"], Value::Null);
    }
}
