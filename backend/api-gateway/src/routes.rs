//! Path-prefix route table
//!
//! The table is built once from configuration and only read afterwards.
//! Rules are scanned in declaration order and the first matching prefix
//! wins; there is no longest-match tie-breaking.

use actix_middleware::{GatewayError, PathPatterns};

use crate::config::ServiceEndpoints;

pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: &'static str,
    pub path_prefixes: Vec<&'static str>,
    pub base_url: String,
}

impl ServiceTarget {
    pub fn new(name: &'static str, path_prefixes: &[&'static str], base_url: impl Into<String>) -> Self {
        Self {
            name,
            path_prefixes: path_prefixes.to_vec(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route for path")]
    NoRoute,
}

impl From<RouteError> for GatewayError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NoRoute => GatewayError::NoRoute,
        }
    }
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute<'a> {
    pub target: &'a ServiceTarget,
    /// The rule prefix that matched
    pub prefix: &'static str,
    /// Path with the API prefix removed; appended to the target base URL
    pub service_path: String,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    targets: Vec<ServiceTarget>,
}

impl RouteTable {
    pub fn new(targets: Vec<ServiceTarget>) -> Self {
        Self { targets }
    }

    /// Standard service layout
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Self {
        Self::new(vec![
            ServiceTarget::new("auth", &["/auth"], &endpoints.auth_service),
            ServiceTarget::new(
                "business",
                &["/business", "/branches"],
                &endpoints.business_service,
            ),
            ServiceTarget::new(
                "inventory",
                &["/products", "/stock"],
                &endpoints.inventory_service,
            ),
            ServiceTarget::new(
                "transaction",
                &["/transactions"],
                &endpoints.transaction_service,
            ),
            ServiceTarget::new("file", &["/files"], &endpoints.file_service),
            ServiceTarget::new(
                "menu",
                &["/menu", "/categories", "/items"],
                &endpoints.menu_service,
            ),
            ServiceTarget::new("order", &["/orders"], &endpoints.order_service),
            ServiceTarget::new("table", &["/tables"], &endpoints.table_service),
        ])
    }

    pub fn targets(&self) -> &[ServiceTarget] {
        &self.targets
    }

    pub fn resolve(&self, path: &str) -> Result<ResolvedRoute<'_>, RouteError> {
        let service_path = path.strip_prefix(API_PREFIX).unwrap_or(path);

        self.targets
            .iter()
            .find_map(|target| {
                target
                    .path_prefixes
                    .iter()
                    .find(|prefix| service_path.starts_with(**prefix))
                    .map(|prefix| ResolvedRoute {
                        target,
                        prefix: *prefix,
                        service_path: service_path.to_string(),
                    })
            })
            .ok_or(RouteError::NoRoute)
    }
}

impl PathPatterns for RouteTable {
    fn pattern(&self, path: &str) -> Option<String> {
        match path {
            "/health" | "/metrics" => Some(path.to_string()),
            _ if path.starts_with(API_PREFIX) => self
                .resolve(path)
                .ok()
                .map(|route| format!("{API_PREFIX}{}/*", route.prefix)),
            _ => None,
        }
    }
}
