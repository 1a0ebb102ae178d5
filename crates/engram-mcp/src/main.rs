//! Engram Daemon - persistent memory for AI agents
//!
//! Long-running process serving one durable store over two surfaces:
//! - JSON-RPC tool calls on stdin/stdout (logs stay on stderr)
//! - a REST API under /api/v1 (axum), when enabled by configuration
//!
//! Single-instance enforcement via PID/state files; SIGTERM and Ctrl+C both
//! run the cleanup path.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use engram_core::{Config, Engine};
use engram_mcp::daemon::DaemonLock;
use engram_mcp::protocol::stdio::StdioTransport;
use engram_mcp::rest;
use engram_mcp::router::AppContext;
use engram_mcp::server::ToolServer;

/// Parse command-line arguments, returning an optional config file override.
/// Exits the process for `--help` / `--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Engram Memory Daemon v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Persistent memory engine for AI agents, serving JSON-RPC over stdio");
                println!("and a REST API over one durable store.");
                println!();
                println!("USAGE:");
                println!("    engram-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --config <PATH>         Explicit configuration file");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG               Log level filter (e.g., debug, info, warn, error)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("engram-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'engram-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config_path
}

fn init_logging(config: &Config) {
    // stdout carries JSON-RPC; everything observable goes to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .with_ansi(false)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let config_path = parse_args();

    let config = match config_path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    info!("Engram daemon v{} starting", env!("CARGO_PKG_VERSION"));

    // Single-instance lock; holds the PID and state files for our lifetime
    let lock = match DaemonLock::acquire(&config, true) {
        Ok(lock) => lock,
        Err(e) => {
            error!("Failed to acquire daemon lock: {}", e);
            std::process::exit(1);
        }
    };

    let engine = match Engine::new(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Failed to initialize engine: {}", e);
            lock.cleanup();
            std::process::exit(1);
        }
    };

    // Best-effort vector collection bootstrap; absence degrades search
    engine.init_vector_collection().await;

    let ctx = AppContext::new(Arc::clone(&engine));

    // REST surface runs alongside the stdio loop
    if config.rest_api.enabled {
        let rest_ctx = ctx.clone();
        let host = config.rest_api.host.clone();
        let port = config.rest_api.port;
        tokio::spawn(async move {
            if let Err(e) = rest::serve(rest_ctx, &host, port).await {
                error!("REST API failed: {}", e);
            }
        });
    }

    let server = ToolServer::new(ctx);
    let transport = StdioTransport::new();

    info!("Serving JSON-RPC on stdio");

    // The stdio loop runs in a blocking task so signal handling stays
    // responsive; whichever finishes first triggers shutdown.
    let stdio_task =
        tokio::task::spawn_blocking(move || tokio::runtime::Handle::current().block_on(transport.run(server)));

    tokio::select! {
        result = stdio_task => {
            match result {
                Ok(Ok(())) => info!("stdin closed; shutting down"),
                Ok(Err(e)) => error!("stdio transport error: {}", e),
                Err(e) => error!("stdio task panicked: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    lock.cleanup();
    info!("Engram daemon stopped");
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
