// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics exporter.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered in the text exposition format via [`PrometheusExporter::render`],
//! which backs the gateway's `GET /metrics` endpoint. The recorder is a
//! process-wide singleton; every other component records through the
//! `metrics` macros without touching this crate.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use agw_core::AgwError;

/// Prometheus recorder handle.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Installs the Prometheus recorder globally. Only one recorder can be
    /// installed per process; a second install returns an error.
    pub fn install() -> Result<Self, AgwError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            AgwError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        describe_meters();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Renders all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Clones the underlying handle for the HTTP endpoint closure.
    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }
}

fn describe_meters() {
    metrics::describe_counter!(
        "agw_runs_total",
        "Agent runs by terminal status"
    );
    metrics::describe_counter!(
        "agw_tool_calls_total",
        "Tool invocations by result"
    );
    metrics::describe_counter!(
        "agw_blocked_total",
        "Blocked actions by reason"
    );
    metrics::describe_counter!(
        "agw_bus_lag_total",
        "Events dropped by slow event-bus subscribers"
    );
    metrics::describe_counter!(
        "agw_rate_limit_denials_total",
        "Admissions denied by the rate limiter"
    );
    metrics::describe_counter!(
        "agw_rpc_requests_total",
        "Control-plane requests by method"
    );
    metrics::describe_counter!(
        "agw_rpc_errors_total",
        "Control-plane request failures by method and kind"
    );
    metrics::describe_counter!(
        "agw_inbound_messages_total",
        "Inbound channel messages by channel"
    );
    metrics::describe_gauge!(
        "agw_ws_connections",
        "Active control-plane WebSocket connections"
    );
    metrics::describe_gauge!(
        "agw_subscribers",
        "Active event-bus subscribers"
    );
    metrics::describe_histogram!(
        "agw_run_latency_seconds",
        "Agent run wall-clock latency"
    );
    metrics::describe_histogram!(
        "agw_approval_latency_seconds",
        "Time from approval request to resolution"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_render() {
        // The recorder can only be installed once per process, so this
        // single test exercises install + record + render together.
        let exporter = match PrometheusExporter::install() {
            Ok(e) => e,
            // Another test binary in the same process already installed it.
            Err(_) => return,
        };

        metrics::counter!("agw_runs_total", "status" => "completed").increment(1);
        let rendered = exporter.render();
        assert!(rendered.contains("agw_runs_total"));
    }
}
