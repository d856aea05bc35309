//! # Skiff CLI Entry Point
//!
//! Serves the address-book service and calls it from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Serve over HTTP (default)
//! skiff serve -b 127.0.0.1:6080
//!
//! # Serve over raw TCP, one thread per connection, JSON payloads
//! skiff serve -b 127.0.0.1:6000 --mode threaded --json
//!
//! # Call a method (outputs raw JSON)
//! skiff call http://127.0.0.1:6080 add '{"name": "Dennis Ritchie"}'
//! skiff call http://127.0.0.1:6080 get --kw 'name="Dennis Ritchie"'
//! ```
//!
//! ## URL Format
//!
//! `call` URLs must include the `http://` or `https://` prefix:
//! - ✅ `http://127.0.0.1:6080`
//! - ✅ `https://example.com/rpc`
//! - ❌ `127.0.0.1:6080`

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use serde_json::{Map, Value};
use skiff_cli::addressbook::{self, AddressBook};
use skiff_client::{HttpClient, HttpClientConfig};
use skiff_common::protocol::ProtocolFactory;
use skiff_common::transport::BufferedTransportFactory;
use skiff_server::{
    HttpApp, HttpAppConfig, HttpServer, ServerConfig, SimpleServer, ThreadedServer,
};

#[derive(FromArgs)]
/// Skiff - RPC runtime with a demo address-book service
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Which server shape `serve` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServeMode {
    Simple,
    Threaded,
    Http,
}

impl FromStr for ServeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ServeMode::Simple),
            "threaded" => Ok(ServeMode::Threaded),
            "http" => Ok(ServeMode::Http),
            other => Err(format!(
                "unknown mode '{}' (expected simple, threaded or http)",
                other
            )),
        }
    }
}

/// Arguments for serving the address book.
///
/// # Example
///
/// ```bash
/// skiff serve -b 0.0.0.0:6000 --mode simple
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the address-book service
struct ServeArgs {
    /// address to bind to
    #[argh(option, short = 'b', default = "\"127.0.0.1:6080\".into()")]
    bind: String,

    /// server shape: simple, threaded or http (default)
    #[argh(option, short = 'm', default = "ServeMode::Http")]
    mode: ServeMode,

    /// encode payloads as JSON instead of the compact binary codec
    #[argh(switch)]
    json: bool,

    /// drop the HTTP connection on handler failures instead of answering 500
    #[argh(switch)]
    propagate_errors: bool,
}

/// Arguments for calling one method over HTTP.
///
/// Positional arguments are JSON values; a value that is not valid JSON is
/// sent as a string. Keyword arguments take the form `name=JSON`.
///
/// # Example
///
/// ```bash
/// skiff call http://127.0.0.1:6080 remove '"Dennis Ritchie"'
/// skiff call http://127.0.0.1:6080 ping | jq .
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an address-book method over HTTP
struct CallArgs {
    /// URL of the server, e.g. http://127.0.0.1:6080/
    #[argh(positional)]
    server_address: String,

    /// name of the method to call
    #[argh(positional)]
    method: String,

    /// positional arguments, one JSON value each
    #[argh(positional)]
    args: Vec<String>,

    /// keyword argument as name=JSON (repeatable)
    #[argh(option, long = "kw")]
    keyword: Vec<String>,

    /// encode payloads as JSON instead of the compact binary codec
    #[argh(switch)]
    json: bool,

    /// read timeout in milliseconds, 0 disables it
    #[argh(option, default = "3000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep call output clean for piping
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

fn protocol(json: bool) -> ProtocolFactory {
    if json {
        ProtocolFactory::json()
    } else {
        ProtocolFactory::binary()
    }
}

/// Executes the `serve` subcommand until Ctrl-C.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let protocol = protocol(args.json);
    let processor = Arc::new(addressbook::processor(Arc::new(AddressBook::new())));
    tracing::info!(
        mode = ?args.mode,
        codec = ?protocol.codec(),
        methods = ?processor.method_names(),
        "Starting address-book service"
    );

    match args.mode {
        ServeMode::Http => {
            let config = HttpAppConfig::new()
                .with_protocol(protocol)
                .with_suppress_internal_errors(!args.propagate_errors);
            let app = HttpApp::with_config(processor, config);
            let server = HttpServer::bind(args.bind.as_str(), app).await?;

            tokio::select! {
                result = server.serve() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
            Ok(())
        }
        ServeMode::Simple | ServeMode::Threaded => {
            let config = ServerConfig::new(BufferedTransportFactory::new(), protocol);
            let threaded = args.mode == ServeMode::Threaded;

            let (handle, serve) = if threaded {
                let server = ThreadedServer::with_config(&args.bind, processor, config)?;
                let handle = server.handle()?;
                (handle, tokio::task::spawn_blocking(move || server.serve()))
            } else {
                let server = SimpleServer::with_config(&args.bind, processor, config)?;
                let handle = server.handle()?;
                (handle, tokio::task::spawn_blocking(move || server.serve()))
            };

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutting down");
                    handle.stop();
                }
            });

            serve.await??;
            Ok(())
        }
    }
}

/// Executes the `call` subcommand and prints the outcome as one JSON line.
///
/// A declared exception is printed like a result and turns the exit status
/// non-zero.
async fn run_call(args: CallArgs) -> Result<()> {
    let positional = args.args.iter().map(|raw| parse_value(raw)).collect();
    let keyword = parse_keywords(&args.keyword)?;

    let config = HttpClientConfig::new()
        .with_max_size(1)
        .with_read_timeout(Duration::from_millis(args.timeout_ms))
        .with_protocol(protocol(args.json));
    let client = HttpClient::with_config(&args.server_address, config)?;

    let outcome = addressbook::call_json(&client, &args.method, positional, keyword).await;
    client.close().await;
    let outcome = outcome?;

    println!("{}", serde_json::to_string(&outcome)?);

    if outcome.get("exception").is_some() {
        anyhow::bail!("{} raised a declared exception", args.method);
    }
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_keywords(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut keyword = Map::new();
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid keyword argument '{}': expected name=JSON", pair))?;
        if keyword.insert(name.to_string(), parse_value(raw)).is_some() {
            anyhow::bail!("Keyword argument '{}' given twice", name);
        }
    }
    Ok(keyword)
}
