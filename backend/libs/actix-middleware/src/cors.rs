//! CORS stage
//!
//! Preflight `OPTIONS` requests are answered with 204 immediately. Every
//! response, including rejections from later stages, carries the CORS
//! headers so browsers can read error bodies.

use actix_web::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
};
use actix_web::http::{Method, StatusCode};
use actix_web::HttpResponse;
use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::pipeline::{Flow, Stage};

const ALLOWED_HEADERS: &str = "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, \
     Authorization, accept, origin, Cache-Control, X-Requested-With";
const ALLOWED_METHODS: &str = "POST, OPTIONS, GET, PUT, DELETE, PATCH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parse a comma separated list; `*` or an empty value means any origin
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsStage {
    origins: AllowedOrigins,
}

impl CorsStage {
    pub fn new(origins: AllowedOrigins) -> Self {
        Self { origins }
    }

    pub fn permissive() -> Self {
        Self::new(AllowedOrigins::Any)
    }

    fn allow_origin(&self, ctx: &RequestContext) -> Option<HeaderValue> {
        match &self.origins {
            AllowedOrigins::Any => Some(HeaderValue::from_static("*")),
            AllowedOrigins::List(list) => {
                let origin = ctx.headers.get(ORIGIN)?;
                let origin_str = origin.to_str().ok()?;
                list.iter()
                    .any(|allowed| allowed == origin_str)
                    .then(|| origin.clone())
            }
        }
    }
}

#[async_trait(?Send)]
impl Stage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Flow, GatewayError> {
        if ctx.method == Method::OPTIONS {
            return Ok(Flow::Respond(HttpResponse::NoContent().finish()));
        }
        Ok(Flow::Continue)
    }

    fn complete(&self, ctx: &RequestContext, _status: StatusCode, headers: &mut HeaderMap) {
        let Some(origin) = self.allow_origin(ctx) else {
            return;
        };

        if matches!(self.origins, AllowedOrigins::List(_)) {
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
    }
}
