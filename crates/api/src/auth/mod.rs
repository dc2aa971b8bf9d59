//! Authentication
//!
//! Bearer-token auth for the payment routes. The webhook endpoint is not
//! covered here: its trust comes from provider signature verification.

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtManager};
pub use middleware::{require_auth, AuthUser};
