pub mod auth;
pub mod csrf;
pub mod logging;
pub mod session;

pub use auth::{Authenticate, RequireAuth, RequireRole, SessionUserProvider, UserProvider};
pub use csrf::CsrfGuard;
pub use logging::LoggingMiddleware;
pub use session::SessionMiddleware;
