#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! TCP front end that serves the torus walk line protocol.

use std::{
    io::BufReader,
    net::{SocketAddr, TcpListener, TcpStream},
    path::PathBuf,
    sync::Arc,
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use clap::Parser;
use torus_walk_core::SeedSequence;
use torus_walk_server::{session, ServerConfig, SharedEngine};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Random walk simulation server
#[derive(Parser, Debug)]
#[command(name = "torus-walk-server")]
#[command(about = "Serves random walk simulations over a line protocol")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Port to listen on, overriding the configured port
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.bind.set_port(port);
    }

    let listener = TcpListener::bind(config.bind)
        .with_context(|| format!("failed to bind listener on {}", config.bind))?;
    info!(
        bind = %config.bind,
        server_name = %config.server_name,
        default_density = config.default_density,
        generation_attempts = config.generation_attempts,
        walk_step_cap = config.walk_step_cap,
        "server listening"
    );

    let engine = Arc::new(SharedEngine::new(
        config.engine(),
        Box::new(SeedSequence::new(clock_seed())),
    ));
    let server_name: Arc<str> = Arc::from(config.server_name.as_str());

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
                continue;
            }
        };

        let engine = Arc::clone(&engine);
        let server_name = Arc::clone(&server_name);
        let spawned = thread::Builder::new()
            .name("session".to_owned())
            .spawn(move || handle_connection(stream, &engine, &server_name));
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn session thread");
        }
    }

    Ok(())
}

fn handle_connection(stream: TcpStream, engine: &SharedEngine, server_name: &str) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
    info!(%peer, "client connected");

    let reader = match stream.try_clone() {
        Ok(read_half) => BufReader::new(read_half),
        Err(err) => {
            warn!(%peer, error = %err, "failed to split connection");
            return;
        }
    };

    match session::serve(engine, server_name, reader, stream) {
        Ok(end) => info!(%peer, ?end, "client disconnected"),
        Err(err) => warn!(%peer, error = %err, "session aborted"),
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
