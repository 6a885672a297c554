use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use sportsbuddies_domain::jobs::SweepReport;

const SWEEP_RUNS_TOTAL: &str = "sportsbuddies_worker_sweep_runs_total";
const SWEEP_SCANNED_TOTAL: &str = "sportsbuddies_worker_sweep_scanned_total";
const SWEEP_EXPIRED_TOTAL: &str = "sportsbuddies_worker_sweep_expired_total";
const SWEEP_DURATION_MS: &str = "sportsbuddies_worker_sweep_duration_ms";
const SWEEP_CONSECUTIVE_FAILURES: &str = "sportsbuddies_worker_sweep_consecutive_failures";

/// Port 0 installs the recorder without an HTTP listener.
pub fn init_metrics(port: u16) -> Result<()> {
    if port == 0 {
        PrometheusBuilder::new().install_recorder()?;
    } else {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        tracing::info!(%addr, "worker metrics listener started");
    }
    Ok(())
}

pub fn register_sweep(result: &'static str, report: Option<&SweepReport>, elapsed: Duration) {
    counter!(SWEEP_RUNS_TOTAL, "result" => result).increment(1);
    histogram!(SWEEP_DURATION_MS, "result" => result).record(elapsed.as_secs_f64() * 1_000.0);
    if let Some(report) = report {
        counter!(SWEEP_SCANNED_TOTAL).increment(report.scanned as u64);
        counter!(SWEEP_EXPIRED_TOTAL).increment(report.expired as u64);
    }
}

pub fn set_consecutive_failures(failures: u32) {
    gauge!(SWEEP_CONSECUTIVE_FAILURES).set(f64::from(failures));
}
