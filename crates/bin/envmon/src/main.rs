//! # envmon — environment sensor monitor
//!
//! Composition root that wires a transport, the scan controller and the
//! console renderer together.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize `tracing` logging
//! - Construct the selected transport adapter (btleplug or virtual)
//! - Construct the scan controller, injecting the event bus as observer
//! - Render bus events to stdout
//! - Handle graceful shutdown (Ctrl-C) and scan loss
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod render;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use envsensor_adapter_ble::BtleplugTransport;
use envsensor_adapter_virtual::VirtualTransport;
use envsensor_app::event_bus::InProcessEventBus;
use envsensor_app::ports::BleTransport;
use envsensor_app::scan::ScanController;

use crate::config::{Config, TransportKind};

const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(&config.logging.filter);

    tracing::info!(
        transport = ?config.transport.kind,
        device_name = %config.scan.device_name,
        "envmon starting"
    );

    match config.transport.kind {
        TransportKind::Ble => {
            let transport = BtleplugTransport::new(&config.ble).await?;
            monitor(transport, &config).await
        }
        TransportKind::Virtual => {
            let transport = VirtualTransport::new(config.simulator.clone());
            monitor(transport, &config).await
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter `{filter}` ({err}), falling back to `info`");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Scan until Ctrl-C or until the transport stops delivering advertisements.
async fn monitor<T: BleTransport>(
    transport: T,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let bus = InProcessEventBus::new(EVENT_BUS_CAPACITY);
    let console = tokio::spawn(render::run(bus.subscribe(), config.output.format));

    let controller = ScanController::new(Arc::new(transport), bus, config.timeouts());

    let handle = match controller.start(config.filter()).await {
        Ok(handle) => handle,
        Err(err) => {
            // Let the console print the adapter status before exiting.
            drop(controller);
            let _ = console.await;
            return Err(err.into());
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted, stopping scan");
        }
        () = handle.stopped() => {
            tracing::warn!("scan ended by the transport");
        }
    }

    let active = controller.active_peers();
    if !active.is_empty() {
        tracing::info!(count = active.len(), "leaving active sessions behind");
    }

    controller.stop(handle).await?;
    console.abort();

    Ok(())
}
