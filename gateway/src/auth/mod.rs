pub mod context;
pub mod jwt;
pub mod store;

pub use context::{AuthContext, Principal};
pub use jwt::{CrossDomainClaims, UserClaims};
pub use store::{AuthError, PortalAuthStore};
