// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics). Safe to call more than once;
/// later calls only warn.
pub fn init_telemetry() {
    // 1. Tracing
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "neural_ledger_node=debug".into()),
    );
    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::warn!("Tracing subscriber already installed");
    }

    // 2. Prometheus recorder
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            return;
        }
    }

    describe_metrics();

    metrics::gauge!("neural_ledger_up", 1.0);
}

fn describe_metrics() {
    metrics::describe_counter!("neural_ledger_events_logged_total", "Events admitted to the chain");
    metrics::describe_counter!("neural_ledger_events_rejected_total", "log_event calls that did not admit an event");
    metrics::describe_histogram!("neural_ledger_log_event_duration_seconds", "End-to-end log_event latency");
    metrics::describe_histogram!("neural_ledger_signer_duration_seconds", "Latency of key custody operations");
    metrics::describe_histogram!("neural_ledger_signer_payload_bytes", "Payload size of key custody operations");
    metrics::describe_counter!("neural_ledger_retries_total", "Retried attempts against external services");
    metrics::describe_counter!("neural_ledger_tail_persist_failures_total", "Chain tail writes that failed after publish");
    metrics::describe_counter!("neural_ledger_storage_writes_total", "Durability writes per backend and outcome");
    metrics::describe_histogram!("neural_ledger_storage_write_duration_seconds", "Durability write latency per backend");
    metrics::describe_counter!("neural_ledger_fanout_events_total", "Events processed by the fan-out processor");
    metrics::describe_counter!("neural_ledger_fanout_undecodable_total", "Channel deliveries that could not be decoded");
    metrics::describe_counter!("neural_ledger_compliance_alerts_total", "Compliance hook findings");
    metrics::describe_gauge!("neural_ledger_reconciliation_backlog", "Failed writes awaiting reconciliation");
    metrics::describe_counter!("neural_ledger_checkpoints_total", "Merkle checkpoints created");
}

/// Render the Prometheus exposition text.
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
