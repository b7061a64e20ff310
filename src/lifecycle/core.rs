use crate::context::{RequestContext, Response};
use crate::decoder::{BodyConfig, BodyDecoder};
use crate::error::{ShellError, Stage};
use crate::events::{EventBus, LifecycleEvent};
use crate::hooks::Hooks;
use crate::ids::UnitId;
use crate::router::RouteTable;
use bytes::Bytes;
use http::StatusCode;
use std::any::Any;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Size of each read from a streaming body.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pull-based supplier of body chunks.
///
/// `Ok(None)` signals end of input. The lifecycle applies every chunk to the
/// decoder before asking for the next one.
pub trait BodySource {
    /// # Errors
    ///
    /// Transport failures while reading; the unit fails with [`ShellError::Transport`].
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

/// Body of a unit that carries none (socket messages, bodiless requests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

impl BodySource for NoBody {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(None)
    }
}

/// Reads a body from any [`Read`] in [`READ_CHUNK_SIZE`] pieces.
#[derive(Debug)]
pub struct ReadBody<R> {
    reader: R,
    buf: Vec<u8>,
    done: bool,
}

impl<R: Read> ReadBody<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; READ_CHUNK_SIZE],
            done: false,
        }
    }

    /// Read and drop whatever the decoder did not consume.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub fn drain(&mut self) -> io::Result<u64> {
        let mut skipped = 0u64;
        while let Some(chunk) = self.next_chunk()? {
            skipped += chunk.len() as u64;
        }
        Ok(skipped)
    }
}

impl<R: Read> BodySource for ReadBody<R> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return Ok(None);
                }
                Ok(n) => return Ok(Some(Bytes::copy_from_slice(&self.buf[..n]))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// In-memory body delivered as a fixed sequence of chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkedBody {
    chunks: VecDeque<Bytes>,
}

impl ChunkedBody {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }

    /// Split `body` into chunks of at most `size` bytes.
    #[must_use]
    pub fn split(body: &[u8], size: usize) -> Self {
        Self::new(
            body.chunks(size.max(1))
                .map(Bytes::copy_from_slice)
                .collect::<Vec<_>>(),
        )
    }
}

impl BodySource for ChunkedBody {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.chunks.pop_front())
    }
}

/// Transport-side writer for the single response of a unit.
pub trait ResponseSink {
    /// Write `ctx.response`. Called at most once per unit.
    ///
    /// # Errors
    ///
    /// Transport failures; they are logged and the unit is reported unwritten.
    fn send(&mut self, ctx: &mut RequestContext) -> io::Result<()>;

    /// Called instead of [`ResponseSink::send`] when the context reports
    /// `custom_response_written`.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn skip(&mut self, _ctx: &mut RequestContext) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Arrived,
    PreHook,
    Routing,
    BodyDecode,
    GateHook,
    Exec,
    Error,
    PostHook,
    Responded,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Arrived => "arrived",
            Phase::PreHook => "pre_hook",
            Phase::Routing => "routing",
            Phase::BodyDecode => "body_decode",
            Phase::GateHook => "gate_hook",
            Phase::Exec => "exec",
            Phase::Error => "error",
            Phase::PostHook => "post_hook",
            Phase::Responded => "responded",
        }
    }
}

/// Routes, hooks, decoder settings and lifecycle observers shared by every unit.
#[derive(Debug, Default)]
pub struct ShellConfig {
    pub routes: RouteTable,
    pub hooks: Hooks,
    pub body: BodyConfig,
    pub events: EventBus<Phase, LifecycleEvent>,
}

impl ShellConfig {
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_body_config(mut self, body: BodyConfig) -> Self {
        self.body = body;
        self
    }
}

/// Summary of a completed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub unit_id: UnitId,
    pub status: StatusCode,
    pub route: Option<String>,
    /// Whether the sink wrote the response
    pub written: bool,
    /// Whether the unit went through the error phase
    pub failed: bool,
}

/// Runs units through the phase sequence. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    config: Arc<ShellConfig>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Observer registry for phase transitions.
    #[must_use]
    pub fn events(&self) -> &EventBus<Phase, LifecycleEvent> {
        &self.config.events
    }

    /// Drive one unit from arrival to response.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Fresh context built by the transport adapter
    /// * `body` - Body chunks, pulled only when a route matched
    /// * `sink` - Writer for the single response
    ///
    /// # Returns
    ///
    /// The unit's [`Outcome`]; the context is dropped here.
    pub fn run<B>(
        &self,
        mut ctx: RequestContext,
        body: &mut B,
        sink: &mut dyn ResponseSink,
    ) -> Outcome
    where
        B: BodySource + ?Sized,
    {
        self.enter(&ctx, Phase::Arrived);
        let failed = match self.dispatch(&mut ctx, body) {
            Ok(()) => false,
            Err(err) => {
                self.recover(&mut ctx, &err);
                true
            }
        };
        self.post(&mut ctx);
        self.respond(ctx, sink, failed)
    }

    fn dispatch<B>(&self, ctx: &mut RequestContext, body: &mut B) -> Result<(), ShellError>
    where
        B: BodySource + ?Sized,
    {
        let hooks = &self.config.hooks;

        self.enter(ctx, Phase::PreHook);
        if let Some(hook) = &hooks.on_arrival {
            guard(Stage::Arrival, || hook(ctx))?;
        }
        if !ctx.run_routing {
            debug!(unit_id = %ctx.unit_id, "Routing disabled by pre-hook");
            return Ok(());
        }

        self.enter(ctx, Phase::Routing);
        let target = ctx.route.clone().unwrap_or_else(|| ctx.path.clone());
        let Some(matched) = self.config.routes.resolve(&target) else {
            match &hooks.on_not_found {
                Some(hook) => guard(Stage::NotFound, || hook(ctx))?,
                None => ctx.fail(StatusCode::NOT_FOUND),
            }
            return Ok(());
        };
        ctx.route = Some(matched.route.to_string());
        ctx.params = matched.params;

        self.decode_body(ctx, body)?;

        self.enter(ctx, Phase::GateHook);
        if let Some(gate) = &hooks.before_endpoint {
            if !guard(Stage::BeforeEndpoint, || gate(ctx))? {
                debug!(unit_id = %ctx.unit_id, route = ?ctx.route, "Gate hook declined execution");
                return Ok(());
            }
        }

        self.enter(ctx, Phase::Exec);
        let handler = &matched.handler;
        match &hooks.exec {
            Some(exec) => guard(Stage::Exec, || exec(ctx, handler))?,
            None => {
                let payload = guard(Stage::Handler, || handler(ctx))?;
                ctx.response.payload = payload;
            }
        }
        Ok(())
    }

    fn decode_body<B>(&self, ctx: &mut RequestContext, body: &mut B) -> Result<(), ShellError>
    where
        B: BodySource + ?Sized,
    {
        self.enter(ctx, Phase::BodyDecode);
        let mut decoder = BodyDecoder::select(ctx.content_type(), &self.config.body)
            .map_err(ShellError::MalformedBody)?;
        let kind = decoder.kind();
        let mut chunks = 0usize;
        let mut bytes = 0usize;
        while let Some(chunk) = body.next_chunk().map_err(ShellError::Transport)? {
            chunks += 1;
            bytes += chunk.len();
            decoder.feed(&chunk).map_err(ShellError::MalformedBody)?;
        }
        let decoded = decoder.finish().map_err(ShellError::MalformedBody)?;
        debug!(
            unit_id = %ctx.unit_id,
            decoder = kind,
            chunks,
            bytes,
            fields = decoded.fields.len(),
            files = decoded.files.values().map(Vec::len).sum::<usize>(),
            "Body decoded"
        );
        ctx.absorb(decoded);
        Ok(())
    }

    fn recover(&self, ctx: &mut RequestContext, err: &ShellError) {
        self.enter(ctx, Phase::Error);
        error!(
            unit_id = %ctx.unit_id,
            stage = err.stage(),
            route = ?ctx.route,
            error = %err,
            "Unit failed"
        );
        // Whatever the failed stage claimed to have written is void now.
        ctx.custom_response_written = false;
        // Transport faults skip the error hook: the peer is most likely gone.
        let hook = match err {
            ShellError::Transport(_) => None,
            _ => self.config.hooks.on_error.as_ref(),
        };
        let Some(hook) = hook else {
            fall_back(ctx);
            return;
        };
        if let Err(source) = guarded(|| hook(ctx, err)) {
            let failure = ShellError::ErrorHook(source);
            error!(unit_id = %ctx.unit_id, error = %failure, "Error hook failed, using fallback");
            fall_back(ctx);
        }
    }

    fn post(&self, ctx: &mut RequestContext) {
        self.enter(ctx, Phase::PostHook);
        if !ctx.run_post_hook {
            return;
        }
        let Some(hook) = &self.config.hooks.before_send else {
            return;
        };
        if let Err(err) = guard(Stage::BeforeSend, || hook(ctx)) {
            error!(unit_id = %ctx.unit_id, error = %err, "Post hook failed, using fallback");
            fall_back(ctx);
        }
    }

    fn respond(&self, mut ctx: RequestContext, sink: &mut dyn ResponseSink, failed: bool) -> Outcome {
        self.enter(&ctx, Phase::Responded);
        // Sinks may move the response out of the context.
        let status = ctx.response.status;
        let written = if ctx.custom_response_written {
            debug!(unit_id = %ctx.unit_id, "Response already written by hook or handler");
            if let Err(e) = sink.skip(&mut ctx) {
                warn!(unit_id = %ctx.unit_id, error = %e, "Failed to flush queued frames");
            }
            false
        } else {
            match sink.send(&mut ctx) {
                Ok(()) => true,
                Err(e) => {
                    error!(unit_id = %ctx.unit_id, error = %e, "Failed to write response");
                    false
                }
            }
        };

        info!(
            unit_id = %ctx.unit_id,
            transport = ?ctx.transport,
            method = ctx.method.as_deref().unwrap_or("-"),
            path = %ctx.path,
            route = ?ctx.route,
            status = status.as_u16(),
            elapsed_ms = ctx.elapsed_ms(),
            written,
            failed,
            "Unit completed"
        );

        Outcome {
            unit_id: ctx.unit_id,
            status,
            route: ctx.route.take(),
            written,
            failed,
        }
    }

    fn enter(&self, ctx: &RequestContext, phase: Phase) {
        debug!(unit_id = %ctx.unit_id, phase = phase.as_str(), "Lifecycle phase");
        let events = &self.config.events;
        if events.has_subscribers(&phase) {
            events.emit(
                &phase,
                &LifecycleEvent {
                    unit_id: ctx.unit_id,
                    phase,
                    transport: ctx.transport,
                    route: ctx.route.clone(),
                    status: ctx.response.status.as_u16(),
                },
            );
        }
    }
}

/// Replace whatever the unit built so far with a plain 500 that will be sent.
fn fall_back(ctx: &mut RequestContext) {
    ctx.response = Response::default();
    ctx.custom_response_written = false;
    ctx.fail(StatusCode::INTERNAL_SERVER_ERROR);
}

/// Run a user function, turning an `Err` or a panic into a [`ShellError::Hook`].
fn guard<T>(stage: Stage, f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, ShellError> {
    guarded(f).map_err(|source| ShellError::Hook { stage, source })
}

fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
