//! usbscale-node
//!
//! Polls a USB HID weighing scale and publishes every stable weight reading
//! as a JSON line on stdout. Logs go to stderr.

mod config;
mod error;
mod usb;

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::{
    JsonLinesSink, MeasurementSink, ScaleBridge, ScaleCommand, ScaleEvent, create_scale_bridge,
    setup_logging,
};
use config::NodeConfig;
use error::ScaleError;
use tokio::signal;
use tracing::{debug, error, info, warn};
use usb::{RusbBackend, ScaleSession, UsbBackend, UsbCandidate, list_scales, locate_scale};

#[derive(Parser, Debug)]
#[command(name = "usbscale-node")]
#[command(
    author,
    version,
    about = "USB scale node - Publish weight readings from a USB HID scale"
)]
#[command(long_about = "
Finds a supported USB HID scale, polls it every poll interval and publishes
each stable weight as a JSON line: {\"topic\":\"/scale/weight\",\"data\":1.25}

EXAMPLES:
    # Poll the first scale found
    usbscale-node

    # Poll the second of two identical scales
    usbscale-node --index 2

    # List attached scales and exit
    usbscale-node --list-scales

    # Show raw and ignored reports
    usbscale-node --verbose

CONFIGURATION:
    The node looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbscale-node/node.toml
    3. /etc/usbscale-node/node.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached scales and exit
    #[arg(long)]
    list_scales: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log raw and ignored reports, even at the default log level
    #[arg(short, long)]
    verbose: bool,

    /// Which scale to use when several are attached (1-based)
    #[arg(short, long, value_name = "N")]
    index: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = NodeConfig::default();
        let path = NodeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        NodeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        NodeConfig::load_or_default().context("Failed to load configuration")?
    };

    if let Some(level) = args.log_level {
        config.node.log_level = level;
    }
    if let Some(index) = args.index {
        config.scale.index = index;
    }
    config.node.verbose |= args.verbose;
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.log_filter()).context("Failed to setup logging")?;

    info!("usbscale-node v{}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let backend = RusbBackend::new()
        .map_err(ScaleError::Initialization)
        .map_err(startup_failure)?;

    if args.list_scales {
        return list_scales_mode(&backend, &config);
    }

    let device = locate_scale(&backend, &config.scale.catalog, config.scale.index)
        .map_err(startup_failure)?;
    let session = ScaleSession::open(&backend, &device, config.session_options())
        .map_err(startup_failure)?;

    let (bridge, worker) = create_scale_bridge();
    let worker_handle = usb::spawn_scale_worker(backend, session, worker, config.worker_settings())
        .context("Failed to spawn scale worker thread")?;

    let mut sink = JsonLinesSink::stdout();
    let (stats, stop) = run_node(bridge, &config.publish.topic, &mut sink).await;

    let joined = tokio::task::spawn_blocking(move || worker_handle.join())
        .await
        .context("Failed to join scale worker thread")?;

    info!(
        "Stopped: {} weight(s) published, {} transfer failure(s), {} reopen(s)",
        stats.published, stats.transfer_failures, stats.reopened
    );
    exit_status(stop, joined)
}

/// Turn how the worker ended into the process result
///
/// Only a requested shutdown with a cleanly finished worker is a success.
fn exit_status(stop: StopReason, joined: std::thread::Result<()>) -> Result<()> {
    if let Err(panic) = joined {
        bail!("Scale worker thread panicked: {:?}", panic);
    }
    if stop == StopReason::WorkerExited {
        bail!("Scale worker exited before shutdown was requested");
    }
    Ok(())
}

/// Log a fatal startup error with the step it happened in
fn startup_failure(err: ScaleError) -> anyhow::Error {
    error!("Startup failed at step '{}': {}", err.step(), err);
    anyhow::Error::new(err)
}

/// Print the distinct scales on the bus and exit
fn list_scales_mode(backend: &RusbBackend, config: &NodeConfig) -> Result<()> {
    let devices = backend
        .devices()
        .map_err(ScaleError::Enumeration)
        .map_err(startup_failure)?;
    let scales = list_scales(devices, &config.scale.catalog);

    if scales.is_empty() {
        println!("No USB scales found.");
        return Ok(());
    }

    println!("Found {} USB scale(s):\n", scales.len());
    for (position, scale) in scales.iter().enumerate() {
        let (vendor_id, product_id) = scale
            .device_ids()
            .context("Failed to read device descriptor")?;
        println!(
            "  [{}] {:04x}:{:04x} - {}",
            position + 1,
            vendor_id,
            product_id,
            scale.fingerprint()
        );
    }

    Ok(())
}

/// Why the event loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Signal,
    WorkerExited,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct NodeStats {
    published: u64,
    transfer_failures: u64,
    reopened: u64,
}

/// Publish worker events until Ctrl-C or until the worker exits
async fn run_node<S: MeasurementSink>(
    bridge: ScaleBridge,
    topic: &str,
    sink: &mut S,
) -> (NodeStats, StopReason) {
    let mut stats = NodeStats::default();
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down...");
                if let Err(e) = bridge.send_command(ScaleCommand::Shutdown).await {
                    warn!("Scale worker already gone: {}", e);
                }
                break;
            }
            event = bridge.recv_event() => match event {
                Ok(event) => handle_event(event, topic, sink, &mut stats),
                Err(_) => {
                    error!("Scale worker exited unexpectedly");
                    return (stats, StopReason::WorkerExited);
                }
            },
        }
    }

    // Publish whatever the worker produced before it saw Shutdown
    while let Ok(event) = bridge.recv_event().await {
        handle_event(event, topic, sink, &mut stats);
    }
    (stats, StopReason::Signal)
}

fn handle_event<S: MeasurementSink>(
    event: ScaleEvent,
    topic: &str,
    sink: &mut S,
    stats: &mut NodeStats,
) {
    match event {
        ScaleEvent::Measurement { weight } => match sink.publish(topic, weight) {
            Ok(()) => stats.published += 1,
            Err(e) => error!("Failed to publish weight {}: {}", weight, e),
        },
        ScaleEvent::TransferFailed { error } => {
            stats.transfer_failures += 1;
            debug!("Transfer failure #{}: {}", stats.transfer_failures, error);
        }
        ScaleEvent::SessionReopened { location } => {
            stats.reopened += 1;
            info!("Polling resumed at {}", location);
        }
    }
}
