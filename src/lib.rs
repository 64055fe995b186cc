//! rustf-dispatch - route dispatch for RustF-style web apps
//!
//! Provides the request path of a small MVC stack:
//! - `:name` route patterns matched in registration order
//! - Route groups with inherited prefixes and middleware
//! - Wrap-style middleware with automatic CSRF guarding
//! - A request context with sessions, flash messages, old input and views

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routing;
pub mod session;
pub mod validation;
pub mod views;

// Re-export main types for public API
pub use app::App;
pub use auth::{AuthUser, CurrentUser};
pub use config::AppConfig;
pub use context::{Context, FlashMessage};
pub use error::{Error, Result};
pub use http::{Request, Response, Server};
pub use middleware::{from_fn, Middleware, MiddlewareChain, MiddlewareFn, Next};
pub use routing::{BoxFuture, CsrfPolicy, Handler, Method, RouteHandler, Router};
pub use session::{MemorySessionStorage, Session, SessionData, SessionStorage, SessionStore};
pub use validation::{FieldErrors, Validator};
pub use views::{HandlebarsEngine, Layout, TemplateRenderer, ViewEngine};

// Re-export commonly used external types
pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::*;
    pub use async_trait::async_trait;
    pub use hyper::StatusCode;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
    pub use std::collections::HashMap;
    pub use std::sync::Arc;

    pub use crate::middleware::builtin::{
        Authenticate, CsrfGuard, LoggingMiddleware, RequireAuth, RequireRole, SessionMiddleware,
    };
}
