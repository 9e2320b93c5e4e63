//! Prometheus exporter setup.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::debug;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must run before the loops record anything; counters incremented with no
/// recorder installed are silently dropped by the `metrics` crate. A no-op
/// when the exporter is disabled.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        debug!("metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|e| Error::Metrics(format!("exporter on {}: {e}", config.listen)))?;

    Ok(())
}
