//! Configuration for the API gateway
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! Everything is read once at startup; nothing here changes at runtime.

use actix_middleware::{AllowedOrigins, RateLimitConfig};
use anyhow::{anyhow, bail, Context, Result};
use crypto_core::TokenManager;
use reqwest::Url;
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Path prefixes that skip authentication and address-scope rate limiting
pub const PUBLIC_ENDPOINTS: &[&str] = &[
    "/api/v1/auth/register",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
    "/api/v1/auth/password/reset/request",
    "/api/v1/auth/password/reset",
    "/api/v1/auth/verify",
    "/health",
    "/metrics",
];

/// Liveness probes, excluded from access logging and request metrics
pub const PROBE_PATHS: &[&str] = &["/health"];

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub counter_store: CounterStoreConfig,
    pub services: ServiceEndpoints,
    pub upstream: UpstreamConfig,
    pub rate_limits: RateLimits,
    pub cors: AllowedOrigins,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Falls back to a key derived from `secret`
    pub refresh_secret: Option<String>,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field(
                "refresh_secret",
                &self.refresh_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl JwtConfig {
    pub fn token_manager(&self) -> Result<TokenManager> {
        let manager = match &self.refresh_secret {
            Some(refresh) => TokenManager::new(self.secret.as_bytes(), refresh.as_bytes()),
            None => TokenManager::with_derived_refresh(self.secret.as_bytes()),
        };
        manager.context("failed to initialize token signing keys")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterStoreKind {
    Redis { url: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct CounterStoreConfig {
    pub kind: CounterStoreKind,
    /// Bound on each counter command
    pub command_timeout: Duration,
    /// Bound on the startup connect and PING
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub auth_service: String,
    pub business_service: String,
    pub inventory_service: String,
    pub transaction_service: String,
    pub file_service: String,
    pub menu_service: String,
    pub order_service: String,
    pub table_service: String,
}

impl ServiceEndpoints {
    fn all(&self) -> [(&'static str, &str); 8] {
        [
            ("AUTH_SERVICE_URL", &self.auth_service),
            ("BUSINESS_SERVICE_URL", &self.business_service),
            ("INVENTORY_SERVICE_URL", &self.inventory_service),
            ("TRANSACTION_SERVICE_URL", &self.transaction_service),
            ("FILE_SERVICE_URL", &self.file_service),
            ("MENU_SERVICE_URL", &self.menu_service),
            ("ORDER_SERVICE_URL", &self.order_service),
            ("TABLE_SERVICE_URL", &self.table_service),
        ]
    }

    fn validate(&self) -> Result<()> {
        for (var, raw) in self.all() {
            let url = Url::parse(raw).with_context(|| format!("{var} is not a valid URL"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("{var} must use http or https, got {}", url.scheme());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub per_address: RateLimitConfig,
    pub per_user: RateLimitConfig,
}

impl Config {
    /// Load configuration from the process environment, after `.env`
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            warn!(".env file not found, using process environment only");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt = JwtConfig {
            secret: var("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET must be set"))?,
            refresh_secret: var("JWT_REFRESH_SECRET"),
        };

        let kind = match string_or("COUNTER_STORE", "redis").to_ascii_lowercase().as_str() {
            "redis" => CounterStoreKind::Redis {
                url: var("REDIS_URL").ok_or_else(|| anyhow!("REDIS_URL must be set"))?,
            },
            "memory" => CounterStoreKind::Memory,
            other => bail!("COUNTER_STORE must be `redis` or `memory`, got `{other}`"),
        };

        let services = ServiceEndpoints {
            auth_service: string_or("AUTH_SERVICE_URL", "http://localhost:8081"),
            business_service: string_or("BUSINESS_SERVICE_URL", "http://localhost:8082"),
            inventory_service: string_or("INVENTORY_SERVICE_URL", "http://localhost:8083"),
            transaction_service: string_or("TRANSACTION_SERVICE_URL", "http://localhost:8084"),
            file_service: string_or("FILE_SERVICE_URL", "http://localhost:8085"),
            menu_service: string_or("MENU_SERVICE_URL", "http://localhost:8086"),
            order_service: string_or("ORDER_SERVICE_URL", "http://localhost:8087"),
            table_service: string_or("TABLE_SERVICE_URL", "http://localhost:8088"),
        };
        services.validate()?;

        Ok(Self {
            server: ServerConfig {
                host: string_or("SERVER_HOST", "0.0.0.0"),
                port: parse_or(&var, "PORT", 8080)?,
                workers: parse_or(&var, "SERVER_WORKERS", num_cpus::get())?,
            },
            jwt,
            counter_store: CounterStoreConfig {
                kind,
                command_timeout: Duration::from_millis(parse_or(&var, "REDIS_TIMEOUT_MS", 250)?),
                connect_timeout: Duration::from_secs(parse_or(
                    &var,
                    "REDIS_CONNECT_TIMEOUT_SECS",
                    5,
                )?),
            },
            services,
            upstream: UpstreamConfig {
                timeout: Duration::from_secs(parse_or(&var, "UPSTREAM_TIMEOUT_SECS", 10)?),
                max_body_bytes: parse_or(&var, "MAX_BODY_BYTES", 10 * 1024 * 1024)?,
            },
            rate_limits: RateLimits {
                per_address: RateLimitConfig {
                    max_requests: parse_or(&var, "IP_RATE_LIMIT", 100)?,
                    window_seconds: parse_or(&var, "IP_RATE_WINDOW_SECS", 60)?,
                },
                per_user: RateLimitConfig {
                    max_requests: parse_or(&var, "USER_RATE_LIMIT", 1000)?,
                    window_seconds: parse_or(&var, "USER_RATE_WINDOW_SECS", 60)?,
                },
            },
            cors: AllowedOrigins::parse(&string_or("CORS_ALLOWED_ORIGINS", "*")),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value for {key}: {e}")),
        None => Ok(default),
    }
}
