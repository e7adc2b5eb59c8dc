//! # API Gateway
//!
//! Edge gateway in front of the backend services: authenticates and
//! rate-limits inbound traffic, then forwards each request to the backend
//! that owns its path.
//!
//! ## Modules
//! - `config`: environment configuration
//! - `routes`: ordered path-prefix route table
//! - `proxy`: reverse proxy to backends
//! - `handlers`: HTTP surface

pub mod config;
pub mod handlers;
pub mod proxy;
pub mod routes;

use actix_middleware::{
    AccessLogStage, AuthGate, CorsStage, FixedWindowLimiter, GatewayMetrics, MetricsStage,
    PathAllowList, Pipeline, RateLimitStage,
};
use anyhow::{Context, Result};
use crypto_core::TokenManager;
use redis_utils::{CounterStore, MemoryCounterStore, RedisCounterStore, RedisPool};
use std::sync::Arc;
use tracing::{info, warn};

use config::{Config, CounterStoreConfig, CounterStoreKind, PROBE_PATHS, PUBLIC_ENDPOINTS};
use proxy::ReverseProxy;
use routes::RouteTable;

/// Service label on every metric
pub const SERVICE_NAME: &str = "api-gateway";

/// Shared, read-only state for request handlers
pub struct GatewayState {
    pub routes: Arc<RouteTable>,
    pub proxy: ReverseProxy,
    pub metrics: GatewayMetrics,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(config: &Config, routes: Arc<RouteTable>, metrics: GatewayMetrics) -> Result<Self> {
        let proxy = ReverseProxy::new(config.upstream.timeout, metrics.clone())
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            routes,
            proxy,
            metrics,
            max_body_bytes: config.upstream.max_body_bytes,
        })
    }
}

/// Assemble the request pipeline in its fixed order
pub fn build_pipeline(
    config: &Config,
    tokens: TokenManager,
    store: Arc<dyn CounterStore>,
    metrics: GatewayMetrics,
    routes: Arc<RouteTable>,
) -> Pipeline {
    let public = PathAllowList::new(PUBLIC_ENDPOINTS.iter().copied());
    let probes = PathAllowList::new(PROBE_PATHS.iter().copied());

    Pipeline::new()
        .stage(CorsStage::new(config.cors.clone()))
        .stage(AccessLogStage::new(probes.clone()))
        .stage(AuthGate::new(tokens, public.clone()))
        .stage(
            RateLimitStage::new(
                FixedWindowLimiter::new(store),
                config.rate_limits.per_address,
                config.rate_limits.per_user,
                public,
            )
            .with_metrics(metrics.clone()),
        )
        .stage(MetricsStage::new(metrics, routes, probes))
}

/// Connect the configured counter store
///
/// For Redis the server must answer `PING` before startup continues.
pub async fn connect_counter_store(config: &CounterStoreConfig) -> Result<Arc<dyn CounterStore>> {
    match &config.kind {
        CounterStoreKind::Redis { url } => {
            let pool = RedisPool::connect(url, config.connect_timeout)
                .await
                .context("failed to connect to the counter store")?;
            info!(addr = %pool.addr(), "Using Redis counter store");
            Ok(Arc::new(RedisCounterStore::new(
                pool.manager(),
                config.command_timeout,
            )))
        }
        CounterStoreKind::Memory => {
            warn!("Using in-process counter store; limits are not shared across instances");
            Ok(Arc::new(MemoryCounterStore::new()))
        }
    }
}
