use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total mutations attempted. Labels: op, status.
pub const MUTATIONS_TOTAL: &str = "headroom_mutations_total";

/// Counter: assignment writes rejected because the capacity ceiling
/// would be exceeded.
pub const CAPACITY_REJECTIONS_TOTAL: &str = "headroom_capacity_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: engineers currently tracked.
pub const ENGINEERS_ACTIVE: &str = "headroom_engineers_active";

/// Gauge: projects currently tracked.
pub const PROJECTS_ACTIVE: &str = "headroom_projects_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "headroom_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "headroom_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
