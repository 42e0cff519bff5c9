pub mod middleware;
pub mod password;
pub mod token;

pub use middleware::{AuthMiddleware, IdentityExt};
pub use token::{IssuedToken, TokenClaims, TokenCodec, TokenError};
