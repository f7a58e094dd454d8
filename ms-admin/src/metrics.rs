use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use ms_base::{fatal, Result};

/// Install the process-wide Prometheus recorder and return a handle that can
/// render the current snapshot as text for a `/metrics` endpoint. Every
/// `counter!`/`gauge!` call anywhere in the workspace reports through this
/// recorder once installed.
pub fn install() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| fatal(format!("installing metrics recorder: {e}")))
}
