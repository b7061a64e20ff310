//! # Server Configuration Module
//!
//! Environment-variable configuration for the `anteroom` listeners, the
//! coroutine runtime and the body decoders.
//!
//! ## Environment Variables
//!
//! | Variable                         | Default          | Meaning                                  |
//! |----------------------------------|------------------|------------------------------------------|
//! | `ANTEROOM_HTTP_ADDR`             | `0.0.0.0:3000`   | HTTP listener address                    |
//! | `ANTEROOM_WS_ADDR`               | `0.0.0.0:3001`   | Socket listener address                  |
//! | `ANTEROOM_STACK_SIZE`            | `0x10000`        | Coroutine stack size (decimal or `0x…`)  |
//! | `ANTEROOM_USE_JSON_PARSER`       | `true`           | Decode `application/json` bodies         |
//! | `ANTEROOM_USE_URLENCODED_PARSER` | `true`           | Decode urlencoded form bodies            |
//! | `ANTEROOM_USE_MULTIPART_PARSER`  | `true`           | Decode `multipart/form-data` bodies      |
//! | `ANTEROOM_UPLOAD_DIR`            | system temp dir  | Where multipart file parts are written   |
//!
//! Unparseable values fall back to the default.
//!
//! ## Usage
//!
//! ```rust
//! use anteroom::config::ServerConfig;
//!
//! let config = ServerConfig::from_env();
//! println!("HTTP on {}, sockets on {}", config.http_addr, config.ws_addr);
//! ```
//!
//! Each coroutine reserves its full stack: 10 000 open connections at the
//! default 64 KiB is roughly 640 MB of virtual memory.

use crate::decoder::BodyConfig;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_WS_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Listener, runtime and decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_addr: String,
    pub ws_addr: String,
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    pub body: BodyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            ws_addr: DEFAULT_WS_ADDR.to_string(),
            stack_size: DEFAULT_STACK_SIZE,
            body: BodyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default)
        };
        Self {
            http_addr: lookup("ANTEROOM_HTTP_ADDR").unwrap_or(defaults.http_addr),
            ws_addr: lookup("ANTEROOM_WS_ADDR").unwrap_or(defaults.ws_addr),
            stack_size: lookup("ANTEROOM_STACK_SIZE")
                .and_then(|v| parse_stack_size(&v))
                .unwrap_or(defaults.stack_size),
            body: BodyConfig {
                use_json_parser: flag("ANTEROOM_USE_JSON_PARSER", defaults.body.use_json_parser),
                use_urlencoded_parser: flag(
                    "ANTEROOM_USE_URLENCODED_PARSER",
                    defaults.body.use_urlencoded_parser,
                ),
                use_multipart_parser: flag(
                    "ANTEROOM_USE_MULTIPART_PARSER",
                    defaults.body.use_multipart_parser,
                ),
                upload_dir: lookup("ANTEROOM_UPLOAD_DIR")
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
                    .unwrap_or(defaults.body.upload_dir),
            },
        }
    }
}

/// Parse a stack size given in decimal or `0x` hexadecimal.
#[must_use]
pub fn parse_stack_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

/// Parse a boolean toggle (`true/false`, `1/0`, `yes/no`, `on/off`).
#[must_use]
pub fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
