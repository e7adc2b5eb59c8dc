//! Access log stage
//!
//! Emits one structured line per request once the final status is known.
//! Probe paths are skipped so liveness checks don't flood the log.

use actix_web::http::header::HeaderMap;
use actix_web::http::StatusCode;
use async_trait::async_trait;

use crate::allow_list::PathAllowList;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::pipeline::{Flow, Stage};

#[derive(Debug, Clone, Default)]
pub struct AccessLogStage {
    skip: PathAllowList,
}

impl AccessLogStage {
    pub fn new(skip: PathAllowList) -> Self {
        Self { skip }
    }
}

#[async_trait(?Send)]
impl Stage for AccessLogStage {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn bypass(&self, ctx: &RequestContext) -> bool {
        self.skip.matches(&ctx.path)
    }

    async fn process(&self, _ctx: &mut RequestContext) -> Result<Flow, GatewayError> {
        Ok(Flow::Continue)
    }

    fn complete(&self, ctx: &RequestContext, status: StatusCode, _headers: &mut HeaderMap) {
        let elapsed = ctx.started_at.elapsed();

        tracing::info!(
            method = %ctx.method,
            path = %ctx.path,
            query = %ctx.query,
            status = status.as_u16(),
            latency_ms = elapsed.as_millis() as u64,
            client_ip = %ctx.client_ip,
            user_agent = %ctx.user_agent(),
            "Request processed"
        );
    }
}
