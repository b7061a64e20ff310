//! Lifecycle hooks.
//!
//! Every hook is optional. A hook that returns `Err` (or panics) moves the unit
//! to the error phase, except `before_send`, whose failure replaces the
//! response with the 500 fallback.
//!
//! | Hook              | Runs                                   | Can                                            |
//! |-------------------|----------------------------------------|------------------------------------------------|
//! | `on_arrival`      | first, before routing                  | force `ctx.route`, clear `ctx.run_routing`     |
//! | `on_not_found`    | no route matched                       | shape the response (default: 404)              |
//! | `before_endpoint` | after body decode                      | return `false` to skip the handler             |
//! | `exec`            | instead of calling the handler         | wrap the handler call                          |
//! | `before_send`     | last, unless `ctx.run_post_hook` unset | replace the response, mark it already written  |
//! | `on_error`        | after any failure above                | render the failure (default: 500)              |
//! | `on_connect`      | once per socket connection             | seed the connection [`Session`]                |

use crate::context::{RequestContext, Session};
use crate::error::ShellError;
use crate::router::Handler;
use std::fmt;
use std::sync::Arc;

pub type ContextHook = Arc<dyn Fn(&mut RequestContext) -> anyhow::Result<()> + Send + Sync>;
pub type GateHook = Arc<dyn Fn(&mut RequestContext) -> anyhow::Result<bool> + Send + Sync>;
pub type ExecHook =
    Arc<dyn Fn(&mut RequestContext, &Handler) -> anyhow::Result<()> + Send + Sync>;
pub type ErrorHook =
    Arc<dyn Fn(&mut RequestContext, &ShellError) -> anyhow::Result<()> + Send + Sync>;
pub type ConnectHook = Arc<dyn Fn(&Session) -> anyhow::Result<()> + Send + Sync>;

/// The set of user hooks shared by every unit.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_arrival: Option<ContextHook>,
    pub on_not_found: Option<ContextHook>,
    pub before_endpoint: Option<GateHook>,
    pub exec: Option<ExecHook>,
    pub before_send: Option<ContextHook>,
    pub on_error: Option<ErrorHook>,
    pub on_connect: Option<ConnectHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_arrival", &self.on_arrival.is_some())
            .field("on_not_found", &self.on_not_found.is_some())
            .field("before_endpoint", &self.before_endpoint.is_some())
            .field("exec", &self.exec.is_some())
            .field("before_send", &self.before_send.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .finish()
    }
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_arrival<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_arrival = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_not_found<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_not_found = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn before_endpoint<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.before_endpoint = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn exec<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext, &Handler) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.exec = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext, &ShellError) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Session) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(hook));
        self
    }
}
