use std::env;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackrunner::Config;
use trackrunner::vehicle::sim::{self, TrackLayout};
use trackrunner::vehicle::transport::{connect_tcp, pump_frames, read_frames};
use trackrunner::vehicle::{ChannelTransport, Session, TrackLogEntry, TrackScanner};

const DEFAULT_SIM_ADDR: &str = "127.0.0.1:8000";

const USAGE: &str = "usage:
  trackrunner sim [bind-addr] [config.json]
  trackrunner scan <addr> [config.json]
  trackrunner demo [config.json]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        bail!(USAGE);
    };

    match command.as_str() {
        "sim" => {
            let addr = args.get(2).map(String::as_str).unwrap_or(DEFAULT_SIM_ADDR);
            let config = load_config(args.get(3))?;
            sim::serve(addr, TrackLayout::oval(), config.sim).await?;
        }
        "scan" => {
            let addr = args.get(2).context("scan needs the bridge address")?;
            let config = load_config(args.get(3))?;
            let (transport, reader) = connect_tcp(addr.as_str())
                .await
                .with_context(|| format!("connecting to {}", addr))?;
            let session = Arc::new(Session::new(transport));
            tokio::spawn(read_frames(reader, Arc::clone(&session)));
            print_lap(&scan(session, config).await?)?;
        }
        "demo" => {
            let config = load_config(args.get(2))?;
            let (transport, telemetry) = sim::spawn(
                TrackLayout::oval(),
                config.sim.clone(),
                config.scan.event_queue_capacity,
            );
            let session = Arc::new(Session::new(transport));
            tokio::spawn(pump_frames(telemetry, Arc::clone(&session)));
            print_lap(&scan(session, config).await?)?;
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }

    Ok(())
}

fn load_config(path: Option<&String>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading config from {}", path)),
        None => Ok(Config::default()),
    }
}

async fn scan(
    session: Arc<Session<ChannelTransport>>,
    config: Config,
) -> anyhow::Result<Vec<TrackLogEntry>> {
    session.on_service_ready().await?;
    session.on_channels_ready().await?;

    let scanner = TrackScanner::new(Arc::clone(&session), config.scan);
    let cancel = scanner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, cancelling scan");
            cancel.cancel();
        }
    });

    let lap = scanner.scan_track().await.context("track scan failed")?;

    let vehicle = session.info().await;
    if let Some(version) = vehicle.version {
        info!("scanned with firmware 0x{:04x}", version);
    }
    session.disconnect().await?;
    Ok(lap)
}

fn print_lap(lap: &[TrackLogEntry]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(lap)?);
    Ok(())
}
