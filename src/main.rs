//! doc-assistant-mcp: MCP server for a directory of plain-text documents
//!
//! Serves tools to append to and search documents, resources to list and
//! read them, and prompts that guide an assistant towards the tools.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use doc_assistant_mcp::assistant::doc_assistant_registry;
use doc_assistant_mcp::config;
use doc_assistant_mcp::mcp::server::McpServer;
use doc_assistant_mcp::store::DocumentStore;

/// MCP server for a directory of plain-text documents.
///
/// Speaks JSON-RPC on stdin/stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "doc-assistant-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Directory holding the documents (overrides the configuration file)
    #[arg(short, long, value_name = "DIR")]
    documents_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the doc-assistant-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("See config/example-config.json for the expected format");
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = args.documents_dir {
        cfg.documents_dir = dir;
    }

    init_tracing(cfg.logging.resolve_level(args.verbose, args.quiet));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting doc-assistant-mcp server"
    );

    let store = match DocumentStore::open(&cfg.documents_dir, cfg.search.case_sensitivity()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Cannot open document store");
            return ExitCode::FAILURE;
        }
    };

    info!(documents_dir = %store.root().display(), "Document store ready");

    let registry = match doc_assistant_registry(store) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Cannot register capabilities");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(registry);

    info!("MCP server ready, waiting for client connection...");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
