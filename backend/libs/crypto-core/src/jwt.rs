/// Token issuing and validation for the gateway and the auth backend
///
/// Tokens are HS256 JSON Web Tokens carrying the caller identity
/// (`user_id`, `business_id`, `role`) and a `token_type` discriminator.
///
/// ## Security Design
///
/// - Access and refresh tokens are signed with different keys. A refresh token
///   presented as an access token fails signature verification before the
///   discriminator is even looked at.
/// - When no dedicated refresh secret is configured, the refresh key is derived
///   from the access secret with HKDF-SHA256, so the two keys still differ.
/// - Expiry and not-before are checked with zero leeway.
/// - Validation is a pure function of (token, key): no I/O, no shared state.
use std::fmt;

use chrono::{Duration, Utc};
use hkdf::Hkdf;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::roles::{Permission, Role};

// ============================================================================
// Constants
// ============================================================================

const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const REFRESH_TOKEN_TTL_DAYS: i64 = 14;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// HKDF `info` label for the derived refresh signing key
const REFRESH_KEY_INFO: &[u8] = b"refresh-token-signing-key";

// ============================================================================
// Data Structures
// ============================================================================

/// Token kind discriminator, serialized as `token_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity extracted from a validated token
///
/// Field names on the wire match what the auth backend issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename = "user_id")]
    pub subject_id: Uuid,
    #[serde(rename = "business_id")]
    pub tenant_id: Uuid,
    pub role: Role,
    #[serde(rename = "token_type")]
    pub kind: TokenKind,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "nbf", default)]
    pub not_before: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl IdentityClaims {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }
}

/// Access + refresh token pair handed out by the auth backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("expected {expected} token, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("access and refresh secrets must differ")]
    SharedSecret,

    #[error("refresh key derivation failed")]
    KeyDerivation,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Key Material
// ============================================================================

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

fn derive_refresh_secret(access_secret: &[u8]) -> Result<[u8; 32], TokenError> {
    let hk = Hkdf::<Sha256>::new(None, access_secret);
    let mut okm = [0u8; 32];
    hk.expand(REFRESH_KEY_INFO, &mut okm)
        .map_err(|_| TokenError::KeyDerivation)?;
    Ok(okm)
}

// ============================================================================
// Token Manager
// ============================================================================

/// Issues and validates access/refresh tokens
///
/// Immutable after construction; clone freely and share across workers.
#[derive(Clone)]
pub struct TokenManager {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenManager {
    /// Build a manager from two distinct secrets
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, TokenError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        if access_secret == refresh_secret {
            return Err(TokenError::SharedSecret);
        }

        Ok(Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            access_ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
        })
    }

    /// Build a manager whose refresh key is derived from the access secret
    pub fn with_derived_refresh(access_secret: &[u8]) -> Result<Self, TokenError> {
        if access_secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let refresh_secret = derive_refresh_secret(access_secret)?;
        Self::new(access_secret, &refresh_secret)
    }

    /// Override token lifetimes
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Generate a signed token of the given kind
    pub fn generate(
        &self,
        kind: TokenKind,
        subject_id: Uuid,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = IdentityClaims {
            subject_id,
            tenant_id,
            role,
            kind,
            issued_at: now.timestamp(),
            not_before: now.timestamp(),
            expires_at: (now + self.ttl(kind)).timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Generate both access and refresh tokens
    pub fn generate_token_pair(
        &self,
        subject_id: Uuid,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.generate(TokenKind::Access, subject_id, tenant_id, role)?,
            refresh_token: self.generate(TokenKind::Refresh, subject_id, tenant_id, role)?,
        })
    }

    /// Validate a token and return its claims
    ///
    /// ## Errors
    ///
    /// - signature does not match the key for `expected`
    /// - token is structurally malformed (including unknown roles)
    /// - token is expired or not yet valid
    /// - `token_type` differs from `expected`
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<IdentityClaims, TokenError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let data = decode::<IdentityClaims>(token, &self.keys(expected).decoding, &validation)?;

        if data.claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: data.claims.kind,
            });
        }

        Ok(data.claims)
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
