//! Bearer token authentication gate
//!
//! Requests whose path starts with an allow-listed prefix pass untouched.
//! Everything else must carry `Authorization: Bearer <access token>`; on
//! success the verified claims are attached to the request context.

use actix_web::http::header::AUTHORIZATION;
use async_trait::async_trait;
use crypto_core::{TokenKind, TokenManager};

use crate::allow_list::PathAllowList;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::pipeline::{Flow, Stage};

#[derive(Debug, Clone)]
pub struct AuthGate {
    tokens: TokenManager,
    public_paths: PathAllowList,
}

impl AuthGate {
    pub fn new(tokens: TokenManager, public_paths: PathAllowList) -> Self {
        Self {
            tokens,
            public_paths,
        }
    }
}

/// Split `Bearer <token>` into the token part
///
/// Exactly two space-separated parts are required and the scheme is
/// case sensitive.
pub fn bearer_token(header: &str) -> Result<&str, GatewayError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(GatewayError::MalformedAuthHeader),
    }
}

#[async_trait(?Send)]
impl Stage for AuthGate {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn bypass(&self, ctx: &RequestContext) -> bool {
        self.public_paths.matches(&ctx.path)
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Flow, GatewayError> {
        let header = match ctx.headers.get(AUTHORIZATION) {
            Some(value) if !value.is_empty() => value,
            _ => {
                tracing::warn!(path = %ctx.path, "Authorization header missing");
                return Err(GatewayError::MissingAuthHeader);
            }
        };

        let token = header
            .to_str()
            .map_err(|_| GatewayError::MalformedAuthHeader)
            .and_then(bearer_token)
            .map_err(|e| {
                tracing::warn!(path = %ctx.path, "Malformed authorization header");
                e
            })?;

        let claims = self
            .tokens
            .validate(token, TokenKind::Access)
            .map_err(|e| {
                tracing::warn!(path = %ctx.path, error = %e, "Token validation failed");
                GatewayError::InvalidToken
            })?;

        tracing::debug!(
            user_id = %claims.subject_id,
            business_id = %claims.tenant_id,
            role = %claims.role,
            "Request authenticated"
        );
        ctx.identity = Some(claims);

        Ok(Flow::Continue)
    }
}
