//! Robot stream sender binary entry point
//!
//! Connects to the signaling broker and streams H.264 video to whichever
//! remote viewer currently holds the session.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (ws://localhost:9001 broker, mock engine)
//! cargo run --bin robocast_server
//!
//! # Stream a raw H.264 file over the native engine
//! cargo run --bin robocast_server --features webrtc-engine -- \
//!     --engine webrtc --media-file /data/clip.h264
//!
//! # Point at a different broker and namespace
//! ROBOCAST_BROKER_URL="ws://broker:9001" ROBOCAST_NAMESPACE="robot-7" \
//! cargo run --bin robocast_server
//! ```
//!
//! # Environment Variables
//!
//! Every flag can also be set through its `ROBOCAST_*` variable, plus:
//!
//! - `RUST_LOG`: Logging level (default: `info`)

use anyhow::Context;
use clap::Parser;
use robocast::signaling::protocol::topics;
use robocast::{BrokerClient, EngineKind, StreamConfig, StreamServer};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "robocast_server", version, about = "Robot-side WebRTC video sender")]
struct Args {
    /// Signaling broker WebSocket URL
    #[arg(long, env = "ROBOCAST_BROKER_URL", default_value = "ws://localhost:9001")]
    broker_url: String,

    /// Topic namespace, usually the robot's thing name
    #[arg(long, env = "ROBOCAST_NAMESPACE", default_value = "robocast")]
    namespace: String,

    /// Comma-separated STUN server URLs
    #[arg(
        long,
        env = "ROBOCAST_STUN_SERVERS",
        default_value = "stun:stun.l.google.com:19302",
        value_delimiter = ','
    )]
    stun_servers: Vec<String>,

    /// Raw H.264 file to stream
    #[arg(long, env = "ROBOCAST_MEDIA_FILE")]
    media_file: Option<PathBuf>,

    /// Directory of raw H.264 files to stream in sorted order
    #[arg(long, env = "ROBOCAST_MEDIA_DIR")]
    media_dir: Option<PathBuf>,

    /// Media engine backend
    #[arg(long, env = "ROBOCAST_ENGINE", value_enum, default_value = "mock")]
    engine: EngineKindArg,

    /// Frames per second when streaming a media file
    #[arg(long, env = "ROBOCAST_FILE_FPS", default_value_t = 30)]
    file_fps: u32,

    /// Frames per second for directory and test-pattern sources
    #[arg(long, env = "ROBOCAST_FALLBACK_FPS", default_value_t = 20)]
    fallback_fps: u32,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineKindArg {
    Mock,
    Webrtc,
}

impl From<EngineKindArg> for EngineKind {
    fn from(kind: EngineKindArg) -> Self {
        match kind {
            EngineKindArg::Mock => EngineKind::Mock,
            EngineKindArg::Webrtc => EngineKind::WebRtc,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Set up Ctrl+C handler at the very start
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\nCtrl+C received, shutting down...");

        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }

        // Give graceful shutdown a bounded window
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(3));
            eprintln!("Graceful shutdown timeout (3s), forcing exit");
            std::process::exit(0);
        });
    })
    .context("failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("robocast-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(shutdown_flag))
}

async fn async_main(shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "robocast server starting"
    );

    let config = StreamConfig {
        broker_url: args.broker_url,
        namespace: args.namespace,
        stun_servers: args.stun_servers,
        media_file: args.media_file,
        media_dir: args.media_dir,
        engine: args.engine.into(),
        file_fps: args.file_fps,
        fallback_fps: args.fallback_fps,
    };
    config.validate().context("invalid configuration")?;

    info!(
        broker_url = %config.broker_url,
        namespace = %config.namespace,
        engine = ?config.engine,
        stun_servers = config.stun_servers.len(),
        "configuration loaded"
    );

    let filters = vec![
        topics::offer_filter(&config.namespace),
        topics::candidate_filter(&config.namespace),
    ];
    let mut client = BrokerClient::new(&config.broker_url, filters);
    let inbound = client.connect().await.context("broker connection failed")?;
    info!("connected to signaling broker");

    let mut server = StreamServer::new(config, Arc::new(client.publisher()), inbound);
    let server_task = tokio::spawn(async move {
        server.run().await;
    });

    info!("server running, press Ctrl+C to shut down");

    while !shutdown_flag.load(Ordering::SeqCst) && !server_task.is_finished() {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    info!("shutting down");

    // Closing the broker connection ends the inbound stream; the server loop
    // then tears down all sessions before exiting.
    client.disconnect();
    server_task.await?;

    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
