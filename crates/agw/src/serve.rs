// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `agw serve` command implementation.
//!
//! Wires storage, the planner (with retry + circuit breaker), the tool
//! registry, and the gateway core, then serves the control plane until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agw_config::AgwConfig;
use agw_core::{AgwError, ChannelTransport};
use agw_gateway::{start_server, AppState, Gateway, WebChatChannel};
use agw_llm::{CircuitBreaker, MockPlanner, Planner, ResilientPlanner, RetryPolicy};
use agw_metrics::PrometheusExporter;
use agw_security::ClientKeyVerifier;
use agw_storage::SqliteRepository;
use agw_tools::{builtin, ToolRegistry};

/// Runs the `agw serve` command until SIGINT/SIGTERM.
pub async fn run_serve(config: AgwConfig) -> Result<(), AgwError> {
    init_tracing(&config.log.level, config.log.json);
    info!("starting agw serve");

    // Metrics recorder (process-wide singleton).
    let prometheus = match PrometheusExporter::install() {
        Ok(exporter) => Some(exporter),
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    };
    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        prometheus.as_ref().map(|exporter| {
            let handle = exporter.handle();
            Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>
        });

    // Storage.
    let repo = Arc::new(SqliteRepository::open(&config.server.database_path).await?);

    // Tool registry with built-ins.
    let mut tools = ToolRegistry::new();
    builtin::register_builtins(&mut tools)?;
    info!(count = tools.len(), "tool registry initialized");

    // Planner behind retry + circuit breaker.
    let planner = build_planner(&config)?;

    let verifier = ClientKeyVerifier::new(
        config.security.api_keys.clone(),
        config.security.require_client_auth,
    );
    if verifier.is_locked_out() {
        warn!("client auth required but no API keys configured; all clients will be rejected");
    }

    let host = config.server.host.clone();
    let port = config.server.port;

    let gateway = Arc::new(Gateway::new(config, repo, planner, tools));
    gateway.start().await?;

    // Loopback webchat transport.
    let webchat = WebChatChannel::new("webchat-1", gateway.clone());
    webchat.start().await?;

    let cancel = install_signal_handler();
    let state = AppState {
        gateway: gateway.clone(),
        verifier,
        prometheus_render,
    };

    let result = start_server(&host, port, state, cancel.clone()).await;

    webchat.stop().await.ok();
    gateway.shutdown().await;
    info!("agw serve shutdown complete");
    result
}

fn build_planner(config: &AgwConfig) -> Result<Arc<dyn Planner>, AgwError> {
    let inner: Arc<dyn Planner> = match config.llm.provider.as_str() {
        "mock" => {
            info!("mock planner selected");
            Arc::new(MockPlanner::new())
        }
        other => {
            return Err(AgwError::Config(format!(
                "unknown llm provider '{other}' (only 'mock' is compiled in)"
            )));
        }
    };

    Ok(Arc::new(ResilientPlanner::new(
        inner,
        CircuitBreaker::new(
            config.llm.circuit_threshold,
            Duration::from_secs(config.llm.circuit_cooldown_s),
        ),
        RetryPolicy::default(),
        Duration::from_secs(config.run.llm_timeout_s),
    )))
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("agw={log_level},warn")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
