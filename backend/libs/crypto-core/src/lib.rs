//! Bearer token issuing and validation plus the closed role model carried in
//! token claims.
//!
//! ## Modules
//! - `jwt`: access/refresh token generation and validation
//! - `roles`: roles, permissions and the role → permission table

pub mod jwt;
pub mod roles;

pub use jwt::{IdentityClaims, TokenError, TokenKind, TokenManager, TokenPair};
pub use roles::{Permission, Role};
