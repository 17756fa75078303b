use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use usb_serial_bridge::bridge::outbound_channel;
use usb_serial_bridge::config::{Config, ConfigLoader, LogFormat};
use usb_serial_bridge::discovery::{DeviceProvider, SystemDeviceProvider};
use usb_serial_bridge::session::{SerialSession, SessionHandle};
use usb_serial_bridge::{stdio, Bridge};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bridge a single USB serial device to line-delimited JSON on stdin/stdout.",
    long_about = "Reads one JSON request per line on stdin (requestPermission, openSerial, writeSerial, writeSerialHex, registerReadCallback, closeSerial, pause, resume, destroy, status) and writes one JSON response per line on stdout. Inbound serial data is pushed as data events once a read callback is registered. Logs go to stderr."
)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, overriding the configuration.
    #[arg(long)]
    log_level: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the attached USB serial devices as JSON and exit.
    #[arg(long)]
    list_devices: bool,
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    init_logging(loader.config(), &args);
    match &loader.config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    let config = loader.into_config();

    let provider = Arc::new(SystemDeviceProvider::new());

    if args.list_devices {
        let devices = provider.list();
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let session = SerialSession::with_settings(provider, config.session_settings());
    let handle = SessionHandle::spawn(session)?;

    let (tx, rx) = outbound_channel();
    let bridge = Bridge::new(handle.clone(), tx)
        .with_open_defaults(config.open_defaults()?)
        .with_default_filter(config.discovery.clone());

    tokio::select! {
        result = stdio::run_stdio_interface(bridge, rx) => result?,
        _ = shutdown_signal() => {
            if let Err(e) = handle.shutdown().await {
                warn!("Session shutdown failed: {}", e);
            }
            // A pending stdin read would otherwise hold the runtime open.
            info!("Bridge stopped");
            std::process::exit(0);
        }
    }

    info!("Bridge stopped");
    Ok(())
}

/// Install the tracing subscriber on stderr; stdout carries the JSON protocol.
fn init_logging(config: &Config, args: &Args) {
    // Allow RUST_LOG overrides, then the CLI, then the config file
    let default_level = match args.verbose {
        0 => args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(true)
        .with_level(true);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, starting graceful shutdown");
}
