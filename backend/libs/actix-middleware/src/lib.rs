//! # Actix Middleware Library
//!
//! Request pipeline and stages shared by the edge gateway
//!
//! ## Modules
//! - `pipeline`: ordered stage runner, mounted as a single actix middleware
//! - `cors`: CORS headers and preflight handling
//! - `logging`: structured access log
//! - `jwt_auth`: bearer token gate with a public-path allow-list
//! - `rate_limit`: fixed-window per-address and per-user limiting
//! - `metrics`: Prometheus collectors and the metrics stage

pub mod allow_list;
pub mod context;
pub mod cors;
pub mod error;
pub mod jwt_auth;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;

pub use allow_list::PathAllowList;
pub use context::RequestContext;
pub use cors::{AllowedOrigins, CorsStage};
pub use error::{ErrorBody, GatewayError};
pub use jwt_auth::AuthGate;
pub use logging::AccessLogStage;
pub use metrics::{GatewayMetrics, MetricsStage, PathPatterns};
pub use pipeline::{Flow, Pipeline, Stage};
pub use rate_limit::{FixedWindowLimiter, RateLimitConfig, RateLimitError, RateLimitStage};
