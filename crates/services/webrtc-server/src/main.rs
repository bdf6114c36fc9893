//! Pairlink server binary entry point
//!
//! Serves the call page and the WebSocket signaling endpoint, and relays
//! media between the two clients of the room.
//!
//! # Usage
//!
//! ```bash
//! # HTTPS on 0.0.0.0:8080 with cert.pem/key.pem from the working directory
//! cargo run -p pairlink-server
//!
//! # Plain HTTP for local development
//! cargo run -p pairlink-server -- --no-tls --bind 127.0.0.1:8080
//!
//! # Configure STUN servers
//! cargo run -p pairlink-server -- \
//!   --stun-servers stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302
//! ```

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use pairlink_webrtc::http::{self, AppState};
use pairlink_webrtc::{RelayConfig, RtcPeerConnectionFactory, SessionRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pairlink two-party call server
///
/// Relays audio and video between the two browsers of a call over WebRTC,
/// with SDP and ICE exchanged on a WebSocket.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "PAIRLINK_BIND")]
    bind: SocketAddr,

    /// PEM certificate chain
    #[arg(long, default_value = "cert.pem", env = "PAIRLINK_CERT")]
    cert: PathBuf,

    /// PEM private key
    #[arg(long, default_value = "key.pem", env = "PAIRLINK_KEY")]
    key: PathBuf,

    /// Serve plain HTTP instead of HTTPS
    #[arg(long, default_value_t = false, env = "PAIRLINK_NO_TLS")]
    no_tls: bool,

    /// HTML page served at /call
    #[arg(long, default_value = "index.html", env = "PAIRLINK_PAGE")]
    page: PathBuf,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "PAIRLINK_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// Read buffer for relayed RTP packets, in bytes
    #[arg(
        long,
        default_value_t = pairlink_webrtc::DEFAULT_RELAY_BUFFER_SIZE,
        env = "PAIRLINK_RELAY_BUFFER_SIZE"
    )]
    relay_buffer_size: usize,

    /// Tear a session down when its peer connection fails
    #[arg(long, default_value_t = false, env = "PAIRLINK_CLOSE_ON_PEER_FAILURE")]
    close_on_peer_failure: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\nCtrl+C received, shutting down...");

        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(0);
        }
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("pairlink-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %args.bind,
        tls = !args.no_tls,
        "Pairlink server starting"
    );

    let config = RelayConfig {
        stun_servers: args.stun_servers.clone(),
        relay_buffer_size: args.relay_buffer_size,
        close_on_peer_failure: args.close_on_peer_failure,
        ..Default::default()
    };
    config.validate()?;

    info!(
        stun_servers = ?config.stun_servers,
        relay_buffer_size = config.relay_buffer_size,
        close_on_peer_failure = config.close_on_peer_failure,
        page = %args.page.display(),
        "Relay configuration loaded"
    );

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(config),
        Arc::new(RtcPeerConnectionFactory),
    ));
    let app = http::router(AppState::new(registry, args.page.clone()))
        .into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        while !shutdown_flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("Shutdown signal received, stopping server...");
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(3)));
    });

    if args.no_tls {
        info!("Listening on http://{}", args.bind);
        axum_server::bind(args.bind).handle(handle).serve(app).await?;
    } else {
        let tls = RustlsConfig::from_pem_file(&args.cert, &args.key).await?;
        info!("Listening on https://{}", args.bind);
        axum_server::bind_rustls(args.bind, tls)
            .handle(handle)
            .serve(app)
            .await?;
    }

    info!("Server shut down gracefully");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
