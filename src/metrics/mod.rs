use crate::error::{LimiterError, Result};
use crate::rate_limit::types::{BypassReason, LimitDecision};
use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

pub const DECISIONS_METRIC: &str = "ratelimit_requests_total";
pub const STORE_ERRORS_METRIC: &str = "ratelimit_store_errors_total";
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            LimiterError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            DECISIONS_METRIC,
            "Rate limit decisions by outcome"
        );
        describe_counter!(
            STORE_ERRORS_METRIC,
            "Window store failures that let a request through unaccounted"
        );

        debug!("Rate limit metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> Result<Response<Body>> {
    metrics_response(service.render())
}

/// Wrap rendered metrics in a Prometheus text response
fn metrics_response(body: String) -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)
        .body(Body::from(body))
        .map_err(|e| LimiterError::Internal(format!("Failed to build metrics response: {}", e)))
}

/// Label value for a decision
pub fn outcome_label(decision: &LimitDecision) -> &'static str {
    match decision {
        LimitDecision::Allowed { .. } => "allowed",
        LimitDecision::Rejected { .. } => "rejected",
        LimitDecision::Bypass(BypassReason::Whitelisted) => "whitelisted",
        LimitDecision::Bypass(BypassReason::Responded) => "responded",
        LimitDecision::FailOpen => "fail_open",
    }
}

/// Record a rate limit decision
pub fn record_decision(decision: &LimitDecision) {
    let labels = [("outcome", outcome_label(decision).to_string())];
    counter!(DECISIONS_METRIC, &labels).increment(1);

    if matches!(decision, LimitDecision::FailOpen) {
        counter!(STORE_ERRORS_METRIC).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::types::WindowState;

    #[test]
    fn test_outcome_labels() {
        let state = WindowState::fresh(1, 10, 0);
        assert_eq!(
            outcome_label(&LimitDecision::Allowed {
                key: "k".to_string(),
                state,
                headers: None
            }),
            "allowed"
        );
        assert_eq!(
            outcome_label(&LimitDecision::Rejected {
                key: "k".to_string(),
                state,
                headers: None
            }),
            "rejected"
        );
        assert_eq!(
            outcome_label(&LimitDecision::Bypass(BypassReason::Whitelisted)),
            "whitelisted"
        );
        assert_eq!(outcome_label(&LimitDecision::FailOpen), "fail_open");
    }

    #[tokio::test]
    async fn test_metrics_service_creation() {
        // The recorder can only be installed once per process
        match MetricsService::new() {
            Ok(service) => {
                record_decision(&LimitDecision::FailOpen);
                assert!(service.render().contains(STORE_ERRORS_METRIC));
            }
            Err(e) => {
                assert!(e.to_string().contains("recorder"));
            }
        }
    }

    #[test]
    fn test_metrics_response() {
        let response = metrics_response("ratelimit_requests_total 1\n".to_string()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            PROMETHEUS_CONTENT_TYPE
        );
    }

    #[test]
    fn test_record_decision_without_recorder() {
        record_decision(&LimitDecision::FailOpen);
        record_decision(&LimitDecision::Bypass(BypassReason::Responded));
    }
}
