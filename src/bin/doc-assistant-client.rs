//! doc-assistant-client: demonstration client for doc-assistant-mcp
//!
//! Starts a server, checks it is alive, lists what it offers, then appends
//! to a document, searches it, reads it back and renders a prompt.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{error, Level};
use tracing_subscriber::EnvFilter;

use doc_assistant_mcp::client::{Client, SpawnSpec};
use doc_assistant_mcp::config;
use doc_assistant_mcp::error::ClientError;
use doc_assistant_mcp::mcp::types::render;

/// Demonstration client for doc-assistant-mcp.
#[derive(Parser, Debug)]
#[command(name = "doc-assistant-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server program to start
    #[arg(long, default_value = "doc-assistant-mcp")]
    server: String,

    /// Arguments passed to the server program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Environment variable for the server, as KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    envs: Vec<(String, String)>,

    /// Stop the server when the session closes
    #[arg(long)]
    no_keep_alive: bool,

    /// Document used by the demonstration
    #[arg(long, default_value = "notes.txt")]
    file: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(client: &mut Client, file: &str) -> Result<(), ClientError> {
    client.connect().await?;

    let alive = client.ping().await?;
    println!("Server alive: {alive}");

    let tools: Vec<_> = client.list_tools().await?.into_iter().map(|t| t.name).collect();
    println!("Tools: {tools:?}");

    let resources: Vec<_> = client
        .list_resources()
        .await?
        .into_iter()
        .map(|r| r.uri)
        .collect();
    println!("Resources: {resources:?}");

    let templates: Vec<_> = client
        .list_resource_templates()
        .await?
        .into_iter()
        .map(|t| t.uri_template)
        .collect();
    println!("Resource templates: {templates:?}");

    let prompts: Vec<_> = client.list_prompts().await?.into_iter().map(|p| p.name).collect();
    println!("Prompts: {prompts:?}");

    let appended = client
        .call_tool(
            "append_to_doc",
            json!({ "filename": file, "content": "Hello from MCP client!\n" }),
        )
        .await?;
    println!("append_to_doc: {}", render(&appended.data()));

    let found = client
        .call_tool("search_in_doc", json!({ "filename": file, "keyword": "Hello" }))
        .await?;
    let lines: Vec<String> = match found.data() {
        Value::Array(items) => items.iter().map(render).collect(),
        other => vec![render(&other)],
    };
    println!("search_in_doc:\n{}", lines.join("\n"));

    let uri = format!("docs://{file}");
    for contents in client.read_resource(&uri).await? {
        println!("Content of {file}:\n{}", contents.text);
    }

    let prompt = client
        .get_prompt(
            "append_prompt",
            json!({ "filename": file, "content": "Another line from client." }),
        )
        .await?;
    println!("Generated prompt: {}", prompt.text());

    client.close().await
}

fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cfg.logging.resolve_level(args.verbose, args.quiet));

    let spec = args
        .envs
        .into_iter()
        .fold(
            SpawnSpec::new(args.server).args(args.server_args),
            |spec, (key, value)| spec.env(key, value),
        )
        .keep_alive(!args.no_keep_alive);

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

    let result = runtime.block_on(async {
        let mut client = Client::new(spec, cfg.client);
        // Dropping the client stops the server whatever the outcome.
        run(&mut client, &args.file).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
