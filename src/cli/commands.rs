use crate::config::ServerConfig;
use crate::echo::echo;
use crate::lifecycle::{Lifecycle, ShellConfig};
use crate::logging::{init_logging_with_config, LogConfig};
use crate::router::RouteTable;
use crate::server::{HttpServer, ShellService, SocketServer};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::info;

/// Command-line interface for anteroom
#[derive(Parser)]
#[command(name = "anteroom")]
#[command(about = "Anteroom application-server shell", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve HTTP and sockets with the echo handler
    Serve {
        /// HTTP listener address
        #[arg(long, env = "ANTEROOM_HTTP_ADDR")]
        addr: Option<String>,

        /// Socket listener address
        #[arg(long, env = "ANTEROOM_WS_ADDR")]
        ws_addr: Option<String>,

        /// Do not start the socket listener
        #[arg(long, default_value_t = false)]
        no_socket: bool,
    },
    /// List mounted route prefixes
    Routes,
}

/// Routes mounted by the `serve` command.
#[must_use]
pub fn build_routes() -> RouteTable {
    let mut table = RouteTable::new();
    table.insert_handler("/echo", echo());
    table
}

/// Parse arguments and run the selected command.
///
/// # Errors
///
/// Returns an error if logging cannot be initialized, a listener cannot be
/// bound, or a server coroutine panics.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Routes => {
            for path in build_routes().paths() {
                println!("{path}");
            }
            Ok(())
        }
        Commands::Serve {
            addr,
            ws_addr,
            no_socket,
        } => {
            init_logging_with_config(&LogConfig::from_env())?;

            let mut config = ServerConfig::from_env();
            if let Some(addr) = addr {
                config.http_addr = addr;
            }
            if let Some(ws_addr) = ws_addr {
                config.ws_addr = ws_addr;
            }
            may::config().set_stack_size(config.stack_size);
            info!(
                stack_size = config.stack_size,
                http_addr = %config.http_addr,
                ws_addr = %config.ws_addr,
                "Starting anteroom"
            );

            let lifecycle = Lifecycle::new(
                ShellConfig::new(build_routes()).with_body_config(config.body.clone()),
            );

            let socket = if no_socket {
                None
            } else {
                Some(
                    SocketServer::new(lifecycle.clone())
                        .start(config.ws_addr.as_str())
                        .with_context(|| format!("failed to bind socket listener {}", config.ws_addr))?,
                )
            };
            let http = HttpServer(ShellService::new(lifecycle))
                .start(config.http_addr.as_str())
                .with_context(|| format!("failed to bind HTTP listener {}", config.http_addr))?;

            http.join().map_err(|e| anyhow!("HTTP server panicked: {e:?}"))?;
            if let Some(socket) = socket {
                socket
                    .join()
                    .map_err(|e| anyhow!("socket server panicked: {e:?}"))?;
            }
            Ok(())
        }
    }
}
