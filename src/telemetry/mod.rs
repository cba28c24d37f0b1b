//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Guard that keeps telemetry alive for the process lifetime
pub struct TelemetryGuard {
    pub metrics_addr: Option<SocketAddr>,
}

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, LogFormat::from_json_flag(config.json))?;

    let metrics_addr = match config.metrics_port {
        Some(port) => {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
            tracing::info!(%addr, "Prometheus exporter listening");
            Some(addr)
        }
        None => None,
    };

    Ok(TelemetryGuard { metrics_addr })
}
