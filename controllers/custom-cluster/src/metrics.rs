//! Prometheus metrics and the probe/metrics HTTP server.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Counters exported on `/metrics`.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Reconcile passes by result (`success`, `error`, `input_error`)
    pub reconciliations: IntCounterVec,
    /// Installer jobs created by action
    pub jobs_created: IntCounterVec,
    /// Consumed job outcomes by action and result (`succeeded`, `failed`)
    pub job_outcomes: IntCounterVec,
    /// Credential retrieval attempts by result
    pub credential_retrievals: IntCounterVec,
}

impl Metrics {
    /// Creates the counters and registers them with a fresh registry.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "customcluster_reconciliations_total",
                "Number of CustomCluster reconcile passes",
            ),
            &["result"],
        )?;
        let jobs_created = IntCounterVec::new(
            Opts::new(
                "customcluster_jobs_created_total",
                "Number of installer jobs created",
            ),
            &["action"],
        )?;
        let job_outcomes = IntCounterVec::new(
            Opts::new(
                "customcluster_job_outcomes_total",
                "Number of installer job outcomes consumed",
            ),
            &["action", "result"],
        )?;
        let credential_retrievals = IntCounterVec::new(
            Opts::new(
                "customcluster_credential_retrievals_total",
                "Number of admin kubeconfig retrieval attempts",
            ),
            &["result"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(jobs_created.clone()))?;
        registry.register(Box::new(job_outcomes.clone()))?;
        registry.register(Box::new(credential_retrievals.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            jobs_created,
            job_outcomes,
            credential_retrievals,
        })
    }

    /// Counts one reconcile pass, `None` meaning it succeeded.
    pub fn record_reconciliation(&self, error: Option<&ControllerError>) {
        let result = match error {
            None => "success",
            Some(e) if e.is_input_error() => "input_error",
            Some(_) => "error",
        };
        self.reconciliations.with_label_values(&[result]).inc();
    }

    /// Renders all registered metrics in the text exposition format.
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ControllerError::InvalidConfig(format!("metrics are not UTF-8: {}", e)))
    }
}

fn probe_routes(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route("/metrics", get(serve_metrics))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serves the probe endpoints until the listener fails.
pub async fn serve_probes(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Probe server listening on {}", addr);
    axum::serve(listener, probe_routes(metrics)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_labelled_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.jobs_created.with_label_values(&["init"]).inc();
        metrics.job_outcomes.with_label_values(&["scale-up", "failed"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("customcluster_jobs_created_total{action=\"init\"} 1"));
        assert!(text.contains("customcluster_job_outcomes_total{action=\"scale-up\",result=\"failed\"} 1"));
    }

    #[test]
    fn test_reconciliations_split_input_errors() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconciliation(None);
        metrics.record_reconciliation(None);
        metrics.record_reconciliation(Some(&ControllerError::InvalidDescriptor("bad host".to_string())));
        metrics.record_reconciliation(Some(&ControllerError::Conflict("job exists".to_string())));

        let count = |result: &str| metrics.reconciliations.with_label_values(&[result]).get();
        assert_eq!(count("success"), 2);
        assert_eq!(count("input_error"), 1);
        assert_eq!(count("error"), 1);
    }
}
