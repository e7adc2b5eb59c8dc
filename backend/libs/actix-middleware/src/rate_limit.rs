//! Fixed-window rate limiting over a shared counter store
//!
//! Each key counts requests in a window that starts at the key's first
//! increment. The expiry is set only when the counter is created, so the
//! window is never extended by later traffic. Store failures reject the
//! request (fail closed).

use async_trait::async_trait;
use redis_utils::{CounterStore, CounterStoreError};
use std::sync::Arc;
use std::time::Duration;

use crate::allow_list::PathAllowList;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::pipeline::{Flow, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_address()
    }
}

impl RateLimitConfig {
    /// 100 requests per minute, keyed by client address
    pub fn per_address() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 60,
        }
    }

    /// 1000 requests per minute, keyed by authenticated user
    pub fn per_user() -> Self {
        Self {
            max_requests: 1000,
            window_seconds: 60,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("limit exceeded ({count} requests in window)")]
    Exceeded { count: i64 },

    #[error(transparent)]
    Store(#[from] CounterStoreError),
}

impl From<RateLimitError> for GatewayError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded { .. } => GatewayError::RateLimited,
            RateLimitError::Store(e) => {
                tracing::error!(error = %e, "Rate limit counter store failed");
                GatewayError::RateLimitUnavailable
            }
        }
    }
}

pub fn address_key(ip: &std::net::IpAddr) -> String {
    format!("rate_limit:{ip}")
}

pub fn user_key(subject_id: &uuid::Uuid) -> String {
    format!("user_rate_limit:{subject_id}")
}

/// Increment-then-compare limiter
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Count one request against `key`
    ///
    /// The request that pushes the count past `max_requests` is rejected, so
    /// exactly `max_requests` requests are admitted per window.
    pub async fn check(&self, key: &str, config: RateLimitConfig) -> Result<i64, RateLimitError> {
        let count = self.store.increment(key).await?;

        if count == 1 {
            self.store.expire(key, config.window()).await?;
        }

        if count > i64::from(config.max_requests) {
            return Err(RateLimitError::Exceeded { count });
        }

        Ok(count)
    }
}

/// Per-address then per-user limiting
///
/// Runs after authentication, so the user check applies whenever the
/// request carries a verified identity.
pub struct RateLimitStage {
    limiter: FixedWindowLimiter,
    per_address: RateLimitConfig,
    per_user: RateLimitConfig,
    exempt: PathAllowList,
    metrics: Option<GatewayMetrics>,
}

impl RateLimitStage {
    pub fn new(
        limiter: FixedWindowLimiter,
        per_address: RateLimitConfig,
        per_user: RateLimitConfig,
        exempt: PathAllowList,
    ) -> Self {
        Self {
            limiter,
            per_address,
            per_user,
            exempt,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn enforce(
        &self,
        scope: &'static str,
        key: &str,
        config: RateLimitConfig,
    ) -> Result<(), GatewayError> {
        match self.limiter.check(key, config).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if let RateLimitError::Exceeded { count } = err {
                    tracing::warn!(
                        scope,
                        key,
                        count,
                        limit = config.max_requests,
                        "Rate limit exceeded"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_rate_limit_rejection(scope);
                    }
                }
                Err(err.into())
            }
        }
    }
}

#[async_trait(?Send)]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn bypass(&self, ctx: &RequestContext) -> bool {
        self.exempt.matches(&ctx.path)
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Flow, GatewayError> {
        self.enforce("ip", &address_key(&ctx.client_ip), self.per_address)
            .await?;

        if let Some(identity) = &ctx.identity {
            self.enforce("user", &user_key(&identity.subject_id), self.per_user)
                .await?;
        }

        Ok(Flow::Continue)
    }
}
