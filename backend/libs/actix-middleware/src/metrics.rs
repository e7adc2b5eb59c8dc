//! Prometheus metrics
//!
//! All collectors live in a registry owned by [`GatewayMetrics`] rather than
//! the process-global default, so several gateways (or tests) can coexist in
//! one process.

use actix_web::http::header::HeaderMap;
use actix_web::http::StatusCode;
use async_trait::async_trait;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::allow_list::PathAllowList;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::pipeline::{Flow, Stage};

/// Path label used when a request matches no known route
pub const UNMATCHED_PATH: &str = "undefined";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    service: String,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    requests_by_method: IntCounterVec,
    requests_by_status: IntCounterVec,
    request_errors: IntCounterVec,
    rate_limit_rejections: IntCounterVec,
    upstream_requests: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new(service: impl Into<String>) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["service", "method", "path", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["service", "method", "path"],
        )?;
        let requests_by_method = IntCounterVec::new(
            Opts::new(
                "http_requests_by_method_total",
                "Total number of HTTP requests by method",
            ),
            &["service", "method"],
        )?;
        let requests_by_status = IntCounterVec::new(
            Opts::new(
                "http_requests_by_status_total",
                "Total number of HTTP requests by status category",
            ),
            &["service", "status_category"],
        )?;
        let request_errors = IntCounterVec::new(
            Opts::new("http_request_errors_total", "Total number of HTTP errors"),
            &["service", "error_type"],
        )?;
        let rate_limit_rejections = IntCounterVec::new(
            Opts::new(
                "rate_limit_rejections_total",
                "Requests rejected by the rate limiter",
            ),
            &["service", "scope"],
        )?;
        let upstream_requests = IntCounterVec::new(
            Opts::new(
                "upstream_requests_total",
                "Requests forwarded to backend services",
            ),
            &["service", "target", "outcome"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(requests_by_method.clone()))?;
        registry.register(Box::new(requests_by_status.clone()))?;
        registry.register(Box::new(request_errors.clone()))?;
        registry.register(Box::new(rate_limit_rejections.clone()))?;
        registry.register(Box::new(upstream_requests.clone()))?;

        Ok(Self {
            registry,
            service: service.into(),
            requests_total,
            request_duration,
            requests_by_method,
            requests_by_status,
            request_errors,
            rate_limit_rejections,
            upstream_requests,
        })
    }

    pub fn observe_request(&self, method: &str, path: &str, status: u16, seconds: f64) {
        let service = self.service.as_str();
        let status_label = status.to_string();

        self.requests_total
            .with_label_values(&[service, method, path, status_label.as_str()])
            .inc();
        self.request_duration
            .with_label_values(&[service, method, path])
            .observe(seconds);
        self.requests_by_method
            .with_label_values(&[service, method])
            .inc();
        self.requests_by_status
            .with_label_values(&[service, status_category(status)])
            .inc();

        if let Some(kind) = error_type(status) {
            self.request_errors
                .with_label_values(&[service, kind])
                .inc();
        }
    }

    pub fn record_rate_limit_rejection(&self, scope: &str) {
        self.rate_limit_rejections
            .with_label_values(&[self.service.as_str(), scope])
            .inc();
    }

    pub fn record_upstream(&self, target: &str, outcome: &str) {
        self.upstream_requests
            .with_label_values(&[self.service.as_str(), target, outcome])
            .inc();
    }

    /// Text exposition of every collector in the registry
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn status_category(status: u16) -> &'static str {
    match status {
        100..=199 => "informational",
        200..=299 => "success",
        300..=399 => "redirect",
        400..=499 => "client_error",
        500..=599 => "server_error",
        _ => "unknown",
    }
}

pub fn error_type(status: u16) -> Option<&'static str> {
    match status {
        400..=499 => Some("client_error"),
        500..=599 => Some("server_error"),
        _ => None,
    }
}

/// Maps a concrete request path to a bounded-cardinality label
pub trait PathPatterns: Send + Sync {
    fn pattern(&self, path: &str) -> Option<String>;
}

pub struct MetricsStage {
    metrics: GatewayMetrics,
    patterns: Arc<dyn PathPatterns>,
    skip: PathAllowList,
}

impl MetricsStage {
    pub fn new(metrics: GatewayMetrics, patterns: Arc<dyn PathPatterns>, skip: PathAllowList) -> Self {
        Self {
            metrics,
            patterns,
            skip,
        }
    }
}

#[async_trait(?Send)]
impl Stage for MetricsStage {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn bypass(&self, ctx: &RequestContext) -> bool {
        self.skip.matches(&ctx.path)
    }

    async fn process(&self, _ctx: &mut RequestContext) -> Result<Flow, GatewayError> {
        Ok(Flow::Continue)
    }

    fn complete(&self, ctx: &RequestContext, status: StatusCode, _headers: &mut HeaderMap) {
        let path = self
            .patterns
            .pattern(&ctx.path)
            .unwrap_or_else(|| UNMATCHED_PATH.to_string());

        self.metrics.observe_request(
            ctx.method.as_str(),
            &path,
            status.as_u16(),
            ctx.started_at.elapsed().as_secs_f64(),
        );
    }
}
