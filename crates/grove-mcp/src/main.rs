//! Grove MCP Server
//!
//! A persistent, hierarchical long-term memory store for AI agents,
//! exposed over the Model Context Protocol (stdio transport). Entries are
//! roots under a configured prefix (e.g. `L0003`) holding a tree of
//! indented sub-nodes, with role-gated visibility and a curator audit
//! path for reviewing another agent's memory.

mod protocol;
mod resources;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use grove_core::{Config, Role, Store};

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments and return the optional data directory path.
/// Returns `None` for the path if no `--data-dir` was specified.
/// Exits the process if `--help` or `--version` is requested.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Grove MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("A hierarchical long-term memory store for AI agents, served over MCP.");
                println!();
                println!("USAGE:");
                println!("    grove-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Custom data directory");
                println!();
                println!("ENVIRONMENT:");
                println!("    GROVE_DATA_DIR          Same as --data-dir, lower precedence");
                println!("    GROVE_AGENT_ID          Identifier for this connection's caller");
                println!("    GROVE_AGENT_ROLE        worker (default), al, pl, or ceo");
                println!("    RUST_LOG                Log level filter (e.g., debug, info, warn, error)");
                println!();
                println!("EXAMPLES:");
                println!("    grove-mcp");
                println!("    grove-mcp --data-dir /custom/path");
                println!("    GROVE_AGENT_ROLE=ceo RUST_LOG=debug grove-mcp");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("grove-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --data-dir requires a path argument");
                    eprintln!("Usage: grove-mcp --data-dir <PATH>");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--data-dir=") => {
                let path = arg.strip_prefix("--data-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --data-dir requires a path argument");
                    eprintln!("Usage: grove-mcp --data-dir <PATH>");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Usage: grove-mcp [OPTIONS]");
                eprintln!("Try 'grove-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    data_dir
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments first (before logging init, so --help/--version work cleanly)
    let cli_data_dir = parse_args();

    // Initialize logging to stderr (stdout is for JSON-RPC)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Grove MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let data_dir = cli_data_dir.or_else(|| std::env::var("GROVE_DATA_DIR").ok().map(PathBuf::from));

    let caller_role = std::env::var("GROVE_AGENT_ROLE")
        .map(|s| Role::parse_name(&s))
        .unwrap_or_default();
    if let Ok(agent_id) = std::env::var("GROVE_AGENT_ID") {
        info!(agent_id = %agent_id, role = %caller_role, "connection identity");
    } else {
        info!(role = %caller_role, "connection identity (no GROVE_AGENT_ID set)");
    }

    let store = match Store::open(data_dir, Config::default()) {
        Ok(s) => {
            info!("Store opened successfully");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let server = McpServer::new(store, caller_role);
    let transport = StdioTransport::new();

    info!("Starting MCP server on stdio...");

    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Grove MCP Server shutting down");
}
