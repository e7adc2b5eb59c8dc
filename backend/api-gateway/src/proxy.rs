//! Reverse proxy to backend services
//!
//! One attempt per request with a fixed deadline; failures surface as 502
//! immediately. The backend's status, headers and body are passed through,
//! with the body streamed rather than buffered.

use actix_middleware::{GatewayError, GatewayMetrics, RequestContext};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use reqwest::{redirect, Client, Url};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::routes::ResolvedRoute;

/// Inbound headers not copied to the backend request
///
/// The client recomputes these for the outbound connection and body.
const SKIP_REQUEST_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding"];

/// Backend response headers owned by our own connection to the caller
const SKIP_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
];

pub struct ReverseProxy {
    client: Client,
    metrics: GatewayMetrics,
}

impl ReverseProxy {
    pub fn new(timeout: Duration, metrics: GatewayMetrics) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { client, metrics })
    }

    /// Backend URL: base, then the service path, then the raw query
    pub fn target_url(base_url: &str, service_path: &str, query: &str) -> Result<Url, GatewayError> {
        let mut raw = format!("{}{}", base_url.trim_end_matches('/'), service_path);
        if !query.is_empty() {
            raw.push('?');
            raw.push_str(query);
        }

        Url::parse(&raw).map_err(|e| {
            error!(target_url = %raw, error = %e, "Invalid target URL");
            GatewayError::InvalidTarget
        })
    }

    pub async fn forward(
        &self,
        ctx: &RequestContext,
        route: &ResolvedRoute<'_>,
    ) -> Result<HttpResponse, GatewayError> {
        let target = route.target;
        let url = Self::target_url(&target.base_url, &route.service_path, &ctx.query)?;

        let method = reqwest::Method::from_bytes(ctx.method.as_str().as_bytes())
            .map_err(|_| GatewayError::Upstream)?;
        let mut request = self.client.request(method, url.clone());

        for (name, value) in ctx.headers.iter() {
            if SKIP_REQUEST_HEADERS.contains(&name.as_str()) {
                continue;
            }
            // HeaderMap::iter yields every value of a multi-valued header
            request = request.header(name.as_str(), value.as_bytes());
        }

        if !ctx.body.is_empty() {
            request = request.body(ctx.body.clone());
        }

        debug!(service = target.name, url = %url, method = %ctx.method, "Forwarding request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(service = target.name, url = %url, error = %e, "Upstream request timed out");
                self.metrics.record_upstream(target.name, "timeout");
                return Err(GatewayError::Upstream);
            }
            Err(e) => {
                error!(service = target.name, url = %url, error = %e, "Failed to forward request");
                self.metrics.record_upstream(target.name, "error");
                return Err(GatewayError::Upstream);
            }
        };

        self.metrics.record_upstream(target.name, "ok");

        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);

        for (name, value) in response.headers() {
            if SKIP_RESPONSE_HEADERS.contains(&name.as_str()) {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) else {
                continue;
            };
            builder.append_header((name, value));
        }

        if let Some(len) = response.content_length() {
            builder.no_chunking(len);
        }

        Ok(builder.streaming(response.bytes_stream()))
    }
}
