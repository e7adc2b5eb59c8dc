//! Per-request state threaded through the pipeline
//!
//! A `RequestContext` is created when a request enters the pipeline, filled
//! in by stages (identity after authentication) and by the terminal handler
//! (body bytes), and dropped with the response. It is never shared across
//! requests.

use std::net::IpAddr;
use std::time::Instant;

use actix_web::dev::ServiceRequest;
use actix_web::http::header::{HeaderMap, USER_AGENT};
use actix_web::http::Method;
use actix_web::web::Bytes;
use crypto_core::IdentityClaims;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
    pub headers: HeaderMap,
    pub client_ip: IpAddr,
    pub started_at: Instant,
    /// Set by the authentication gate
    pub identity: Option<IdentityClaims>,
    /// Set by the terminal handler once the payload has been read
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: query.into(),
            headers: HeaderMap::new(),
            client_ip: IpAddr::from([127, 0, 0, 1]),
            started_at: Instant::now(),
            identity: None,
            body: Bytes::new(),
        }
    }

    pub fn from_service_request(req: &ServiceRequest) -> Self {
        Self {
            method: req.method().clone(),
            path: req.path().to_string(),
            query: req.query_string().to_string(),
            headers: req.headers().clone(),
            client_ip: extract_client_ip(req),
            started_at: Instant::now(),
            identity: None,
            body: Bytes::new(),
        }
    }

    pub fn user_agent(&self) -> &str {
        self.headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// Extract client IP from request, respecting X-Forwarded-For header
///
/// The header is trusted whatever the peer is. Behind a proxy that
/// overwrites it this is the real client; exposed directly, a caller can
/// put any address there and so pick its own address-scope rate-limit key.
/// Deploy behind a proxy that sets the header.
pub fn extract_client_ip(req: &ServiceRequest) -> IpAddr {
    // X-Forwarded-For can contain multiple IPs; the first one is the client
    if let Some(x_forwarded_for) = req.headers().get("X-Forwarded-For") {
        if let Ok(header_value) = x_forwarded_for.to_str() {
            if let Some(first_ip) = header_value.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
