use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wt901_core::DeviceAddress;
use wt901_link::{
    Config, JsonLinesSink, NotificationPump, OutputConfig, RadioConfig, RadioStack, ReadingSink,
    Session, SimulatedRadio, TracingSink,
};

#[derive(Parser)]
#[command(name = "wt901-link")]
#[command(about = "Stream motion readings from a WT901 BLE sensor")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "wt901-link.toml")]
    config: PathBuf,

    /// Device address, overriding the configuration file
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "wt901_link=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if let Some(address) = cli.address {
        config.device.address = DeviceAddress::new(address);
    }

    info!(
        address = %config.device.address,
        notify_uuid = %config.device.notify_uuid,
        retry_interval_secs = config.session.retry_interval_secs,
        notify_timeout_secs = config.session.notify_timeout_secs,
        "Starting wt901-link"
    );

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            cancel_for_signal.cancel();
        }
    });

    match config.radio {
        RadioConfig::Sim {
            frame_interval_ms,
            drop_ratio,
            connect_failure_ratio,
        } => {
            info!(frame_interval_ms, drop_ratio, connect_failure_ratio, "Using simulated radio");
            let radio = SimulatedRadio::new(
                Duration::from_millis(frame_interval_ms),
                drop_ratio,
                connect_failure_ratio,
            );
            run_with_radio(radio, &config, cancel).await;
        }
        RadioConfig::Ble { scan_timeout_secs } => {
            run_ble(Duration::from_secs(scan_timeout_secs), &config, cancel).await?;
        }
    }

    info!("wt901-link shut down complete");
    Ok(())
}

#[cfg(feature = "ble")]
async fn run_ble(
    scan_timeout: Duration,
    config: &Config,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    info!(scan_timeout_secs = scan_timeout.as_secs(), "Using BLE radio");
    let radio = wt901_link::radio::ble::BleRadio::new(scan_timeout).await?;
    run_with_radio(radio, config, cancel).await;
    Ok(())
}

#[cfg(not(feature = "ble"))]
async fn run_ble(
    _scan_timeout: Duration,
    _config: &Config,
    _cancel: CancellationToken,
) -> color_eyre::Result<()> {
    Err(color_eyre::eyre::eyre!(
        "BLE radio requested but wt901-link was built without the `ble` feature"
    ))
}

async fn run_with_radio<R: RadioStack>(radio: R, config: &Config, cancel: CancellationToken) {
    match config.output {
        OutputConfig::Log => run_pump(radio, TracingSink, config, cancel).await,
        OutputConfig::Json => {
            run_pump(radio, JsonLinesSink::new(std::io::stdout()), config, cancel).await
        }
    }
}

async fn run_pump<R: RadioStack, S: ReadingSink>(
    radio: R,
    sink: S,
    config: &Config,
    cancel: CancellationToken,
) {
    let session = Session::new(radio, config.device.address.clone())
        .with_notify_uuid(config.device.notify_uuid)
        .with_retry_interval(config.session.retry_interval());

    let report = NotificationPump::new(session, sink, cancel)
        .with_notify_timeout(config.session.notify_timeout())
        .with_resubscribe_on_idle(config.session.resubscribe_on_idle)
        .run()
        .await;

    info!(
        frames = report.frames,
        decode_errors = report.decode_errors,
        idle_timeouts = report.idle_timeouts,
        connect_attempts = report.session.connect_attempts,
        links_lost = report.session.links_lost,
        "Session summary"
    );
}
