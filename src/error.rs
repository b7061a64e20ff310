use crate::decoder::DecodeError;
use std::fmt;
use std::io;

/// Where in the lifecycle a user function failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Arrival,
    NotFound,
    BeforeEndpoint,
    Exec,
    Handler,
    BeforeSend,
    Connect,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Arrival => "on_arrival",
            Stage::NotFound => "on_not_found",
            Stage::BeforeEndpoint => "before_endpoint",
            Stage::Exec => "exec",
            Stage::Handler => "handler",
            Stage::BeforeSend => "before_send",
            Stage::Connect => "on_connect",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one unit. Never crosses into other units.
#[derive(Debug)]
pub enum ShellError {
    /// The request body violated its declared format
    MalformedBody(DecodeError),
    /// A hook or the handler returned an error or panicked
    Hook { stage: Stage, source: anyhow::Error },
    /// The error hook itself failed
    ErrorHook(anyhow::Error),
    /// Reading the body from the connection failed
    Transport(io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::MalformedBody(e) => write!(f, "{e}"),
            ShellError::Hook { stage, source } => write!(f, "{stage} failed: {source:#}"),
            ShellError::ErrorHook(e) => write!(f, "error hook failed: {e:#}"),
            ShellError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::MalformedBody(e) => Some(e),
            ShellError::Hook { source, .. } => Some(&**source),
            ShellError::ErrorHook(e) => Some(&**e),
            ShellError::Transport(e) => Some(e),
        }
    }
}

impl ShellError {
    /// Stage label for logs.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            ShellError::MalformedBody(_) => "body_decode",
            ShellError::Hook { stage, .. } => stage.as_str(),
            ShellError::ErrorHook(_) => "on_error",
            ShellError::Transport(_) => "transport",
        }
    }
}
