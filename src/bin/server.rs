//! BlockKV Server Binary
//!
//! Starts the TCP server for BlockKV.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blockkv::config::DEFAULT_MAX_BLOCKS;
use blockkv::network::Server;
use blockkv::{Config, Engine};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// BlockKV Server
#[derive(Parser, Debug)]
#[command(name = "blockkv-server")]
#[command(about = "Disk-backed key-value store with a B-tree index")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./blockkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4080")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Number of blocks addressable in the db file
    #[arg(long, default_value_t = DEFAULT_MAX_BLOCKS)]
    max_blocks: u64,
}

/// Set by the signal handler, polled by the watcher thread
static SIGNALLED: AtomicBool = AtomicBool::new(false);

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("BlockKV Server v{}", blockkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_blocks(args.max_blocks)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let server = match Server::bind(config, Arc::clone(&engine)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    install_signal_handlers();
    let shutdown = server.shutdown_handle();
    thread::spawn(move || {
        while !SIGNALLED.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
        }
        tracing::info!("Received termination signal, initiating shutdown...");
        shutdown.store(true, Ordering::SeqCst);
    });

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
    drop(server);

    // Every worker has exited, so this is the last reference
    match Arc::try_unwrap(engine) {
        Ok(engine) => {
            if let Err(e) = engine.close() {
                tracing::error!("Failed to close engine: {}", e);
                std::process::exit(1);
            }
        }
        Err(_) => tracing::warn!("Engine still shared at exit, skipping close"),
    }

    tracing::info!("Server stopped");
}

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the shutdown flag
#[cfg(unix)]
fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only performs an atomic store, which is
    // async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}
