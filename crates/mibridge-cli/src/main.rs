//! Command-line interface for mibridge.
//!
//! `run` bridges the configured accessories against the simulated device
//! client and logs every characteristic update; `check` validates a
//! configuration file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use mibridge_accessory::{AccessoryRegistry, CharacteristicUpdate, RegistryEvent};
use mibridge_core::config::{AccessoryConfig, Config, ConfigBuilder};
use mibridge_core::event::SharedEventBus;
use mibridge_core::logging;
use mibridge_core::types::Id;
use mibridge_devices::devices::simulated::{SimulatedClient, SimulatedDevice};
use mibridge_devices::DeviceKind;

/// Environment prefix for configuration overrides, e.g. `MIBRIDGE__LOGGING__LEVEL`
const ENV_PREFIX: &str = "MIBRIDGE";

/// mibridge - expose Mi air purifiers and cameras as accessories.
#[derive(Parser, Debug)]
#[command(name = "mibridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Bridge the configured accessories until interrupted.
    Run {
        /// Seconds between simulated air readings.
        #[arg(long, default_value_t = 5)]
        drift_secs: u64,
        /// Add a demo air purifier and camera when none are configured.
        #[arg(long)]
        demo: bool,
    },
    /// Validate the configuration and list the accessories.
    Check {
        /// Print the effective configuration as TOML.
        #[arg(long)]
        print: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut builder = ConfigBuilder::new().with_environment_prefix(ENV_PREFIX);
    if let Some(path) = path {
        builder = builder.with_config_file(path);
    }
    builder.build().context("invalid configuration")
}

fn demo_accessories() -> Vec<AccessoryConfig> {
    vec![
        AccessoryConfig::new(DeviceKind::AirPurifier, "127.0.0.10", "demo-token"),
        AccessoryConfig::new(DeviceKind::Camera, "127.0.0.11", "demo-token"),
    ]
}

/// Put one simulated device on the network for every configured accessory
fn simulated_network(config: &Config, drift: Duration) -> SimulatedClient {
    let client = SimulatedClient::new();
    for accessory in &config.accessories {
        let Some(address) = accessory.address.as_deref() else {
            continue;
        };
        let device = match accessory.kind {
            DeviceKind::AirPurifier => {
                let device = SimulatedDevice::air_purifier(address);
                device.spawn_ambient_drift(drift);
                device
            }
            DeviceKind::Camera => SimulatedDevice::camera(address),
        };
        client.add_device(device);
    }
    client
}

async fn run(mut config: Config, drift: Duration, demo: bool) -> Result<()> {
    if config.accessories.is_empty() {
        if !demo {
            warn!("No accessories configured; pass --demo to bridge simulated ones");
            return Ok(());
        }
        config.accessories = demo_accessories();
    }

    let events = SharedEventBus::new();
    let mut updates = events.subscribe::<CharacteristicUpdate>()?;
    let mut registry_events = events.subscribe::<RegistryEvent>()?;

    let client = simulated_network(&config, drift);
    let registry = AccessoryRegistry::from_config(&config, Arc::new(client), events.clone())?;

    let mut names: HashMap<Id, String> = HashMap::new();
    while let Ok(RegistryEvent::Added { id, name, kind }) = registry_events.try_recv() {
        info!("Bridging {} ({}) as {}", name, kind, id);
        names.insert(id, name);
    }

    info!(
        "{} serving {} accessories",
        config.general.bridge_name,
        registry.count()?
    );
    registry.start_all()?;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    let name = names
                        .get(&update.accessory)
                        .map(String::as_str)
                        .unwrap_or("?");
                    info!("{} {} = {}", name, update.characteristic, update.value);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} characteristic updates", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    registry.shutdown_all()?;
    Ok(())
}

fn check(config: &Config, print: bool) -> Result<()> {
    println!("Configuration OK: {}", config.general.bridge_name);
    println!(
        "Discovery: retry every {}s, connect timeout {}s, rediscover on loss: {}",
        config.discovery.retry_interval_secs,
        config.discovery.connect_timeout_secs,
        config.discovery.rediscover_on_connection_loss
    );

    if config.accessories.is_empty() {
        println!("No accessories configured");
    }
    for accessory in &config.accessories {
        let name = accessory.display_name();
        println!(
            "  {:<20} {:<12} {:<16} {}",
            name,
            accessory.kind.to_string(),
            accessory.address.as_deref().unwrap_or("-"),
            Id::for_name(&name)
        );
    }

    if print {
        println!();
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    if args.verbose {
        logging::init_with_filter("debug")?;
    } else {
        logging::init_from_config(&config.logging)?;
    }

    match args.command {
        Command::Run { drift_secs, demo } => {
            run(config, Duration::from_secs(drift_secs.max(1)), demo).await
        }
        Command::Check { print } => check(&config, print),
    }
}
