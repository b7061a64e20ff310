use super::request::RequestHead;
use super::response::{write_bad_request, write_response};
use crate::context::{RequestContext, Response as UnitResponse};
use crate::lifecycle::{Lifecycle, ReadBody, ResponseSink};
use may_minihttp::{HttpService, Request, Response};
use std::io;
use tracing::{debug, warn};

/// `may_minihttp` service that feeds every request through the [`Lifecycle`].
#[derive(Clone)]
pub struct ShellService {
    lifecycle: Lifecycle,
}

impl ShellService {
    #[must_use]
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }
}

/// Holds the unit's response until the lifecycle is done with the context.
#[derive(Default)]
struct BufferedSink {
    response: Option<UnitResponse>,
}

impl ResponseSink for BufferedSink {
    fn send(&mut self, ctx: &mut RequestContext) -> io::Result<()> {
        let queued = ctx.drain_outbox();
        if !queued.is_empty() {
            warn!(
                unit_id = %ctx.unit_id,
                frames = queued.len(),
                "Pushed frames are not supported over HTTP, dropping"
            );
        }
        self.response = Some(std::mem::take(&mut ctx.response));
        Ok(())
    }
}

impl HttpService for ShellService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let head = RequestHead::read(&req);
        let Some(ctx) = head.into_context() else {
            warn!(method = %req.method(), target = %req.path(), "Rejected request target");
            write_bad_request(res);
            return Ok(());
        };

        let mut body = ReadBody::new(req.body());
        let mut sink = BufferedSink::default();
        self.lifecycle.run(ctx, &mut body, &mut sink);

        // Unrouted units never read their body; consume it to keep the connection usable.
        match body.drain() {
            Ok(0) => {}
            Ok(skipped) => debug!(skipped, "Unread request body discarded"),
            Err(e) => debug!(error = %e, "Failed to discard request body"),
        }

        if let Some(response) = sink.response {
            write_response(res, response);
        }
        Ok(())
    }
}
