//! Console rendering of bus events.

use std::error::Error as _;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use envsensor_domain::event::{AdapterStatus, SensorEvent, StatusEvent};

use crate::config::OutputFormat;

/// Format one event as a single output line.
pub fn render(event: &SensorEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => text(event),
        OutputFormat::Json => serde_json::to_string(event)
            .unwrap_or_else(|err| format!(r#"{{"type":"render_error","error":"{err}"}}"#)),
    }
}

fn text(event: &SensorEvent) -> String {
    match event {
        SensorEvent::Reading { peer, reading } => format!(
            "{peer}  Temperature: {:.2}  Pressure: {:.2}",
            reading.temperature, reading.pressure
        ),
        SensorEvent::Error { peer, error } => {
            let mut line = format!("{peer}  error: {error}");
            let mut source = error.source();
            while let Some(cause) = source {
                line.push_str(": ");
                line.push_str(&cause.to_string());
                source = cause.source();
            }
            line
        }
        SensorEvent::Status { status } => match status {
            StatusEvent::Adapter {
                adapter: AdapterStatus::Unavailable,
            } => "Bluetooth adapter not available".to_string(),
            StatusEvent::Adapter {
                adapter: AdapterStatus::Disabled,
            } => "Bluetooth is turned off".to_string(),
            StatusEvent::RssiUpdate { peer, rssi } => format!("{peer}  RSSI: {rssi}"),
            StatusEvent::Disconnected { peer } => format!("{peer}  disconnected"),
        },
    }
}

/// Print every event received on `events` until the bus closes.
pub async fn run(mut events: broadcast::Receiver<SensorEvent>, format: OutputFormat) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", render(&event, format)),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "console fell behind, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
