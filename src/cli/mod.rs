//! # CLI Module
//!
//! Command-line entry point for the `anteroom` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start both transports with the echo handler mounted at `/echo`:
//!
//! ```bash
//! anteroom serve --addr 127.0.0.1:3000 --ws-addr 127.0.0.1:3001
//! ```
//!
//! Options:
//! - `--addr <ADDR>` - HTTP listener (overrides `ANTEROOM_HTTP_ADDR`)
//! - `--ws-addr <ADDR>` - socket listener (overrides `ANTEROOM_WS_ADDR`)
//! - `--no-socket` - serve HTTP only
//!
//! ### `routes`
//!
//! Print the mounted route prefixes, one per line.
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! anteroom::cli::run_cli()?;
//! ```

mod commands;


pub use commands::{build_routes, run_cli, Cli, Commands};
