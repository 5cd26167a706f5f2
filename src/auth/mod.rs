//! User authentication, embed session tokens and the auth-service proxy.

pub mod jwt;
pub mod middleware;
pub mod proxy;
pub mod session;

pub use jwt::{JwtVerifier, UserClaims};
pub use middleware::{require_user, AuthUser, ChatbotSession};
pub use proxy::AuthProxy;
pub use session::{SessionClaims, SessionTokens};
