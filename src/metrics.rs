//! Metric catalog and Prometheus exporter setup.
//!
//! Counter and histogram names used across the crate are declared here so the
//! exporter can describe them up front and the rest of the code can refer to
//! them without stringly-typed drift.

use metrics::{describe_counter, describe_histogram};
use std::sync::Once;
use tracing::{info, warn};

pub const CLEAN_RUNS: &str = "scrub_clean_runs_total";
pub const CLEAN_FAILURES: &str = "scrub_clean_failures_total";
pub const CLEAN_INPUT_ROWS: &str = "scrub_clean_input_rows";
pub const CLEAN_OUTPUT_ROWS: &str = "scrub_clean_output_rows";
pub const FILES_SAVED: &str = "scrub_files_saved_total";
pub const FILES_DELETED: &str = "scrub_files_deleted_total";
pub const SWEEP_DELETED: &str = "scrub_sweep_deleted_total";
pub const TOKENS_MINTED: &str = "scrub_tokens_minted_total";
pub const TOKENS_REDEEMED: &str = "scrub_tokens_redeemed_total";
pub const WEBHOOKS_DECLINED: &str = "scrub_webhooks_declined_total";

static INIT: Once = Once::new();

/// Install the Prometheus recorder and HTTP exporter. Idempotent.
///
/// The exporter listens on `SCRUB_METRICS_ADDR` (default `127.0.0.1:9898`)
/// and serves the usual `/metrics` endpoint. Must be called from within a
/// tokio runtime.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = std::env::var("SCRUB_METRICS_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:9898".to_string());
        let addr: std::net::SocketAddr = match addr_str.parse() {
            Ok(a) => a,
            Err(_) => {
                warn!("Invalid metrics addr '{}', using default 127.0.0.1:9898", addr_str);
                "127.0.0.1:9898".parse().unwrap()
            }
        };

        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                describe_metrics();
                info!("Prometheus exporter listening at http://{}/metrics", addr);
            }
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    });
}

fn describe_metrics() {
    describe_counter!(CLEAN_RUNS, "Cleaning pipeline runs that completed");
    describe_counter!(CLEAN_FAILURES, "Cleaning pipeline runs that failed");
    describe_histogram!(CLEAN_INPUT_ROWS, "Rows per uploaded table before cleaning");
    describe_histogram!(CLEAN_OUTPUT_ROWS, "Rows per table after cleaning");
    describe_counter!(FILES_SAVED, "Cleaned tables persisted to the scratch directory");
    describe_counter!(FILES_DELETED, "Stored files deleted on download or by request");
    describe_counter!(SWEEP_DELETED, "Stored files deleted by the age sweep");
    describe_counter!(TOKENS_MINTED, "Download tokens minted after verified payment");
    describe_counter!(TOKENS_REDEEMED, "Download tokens redeemed successfully");
    describe_counter!(WEBHOOKS_DECLINED, "Webhook deliveries declined without minting");
}
