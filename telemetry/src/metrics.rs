use std::{sync::Mutex, time::Duration};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

/// Interval between two upkeep runs of the Prometheus recorder.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

// The recorder is global and can only be installed once, while tests call
// [`init_metrics_handle`] many times. Initialization is fallible, hence the mutex.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the Prometheus recorder and returns a handle for rendering the scrape output.
///
/// Subsequent calls return a clone of the cached handle. Must be called within a tokio
/// runtime because the recorder upkeep runs as a background task.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = match PROMETHEUS_HANDLE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            trace!("running metrics upkeep");
            upkeep_handle.run_upkeep();
        }
    });

    Ok(handle)
}
