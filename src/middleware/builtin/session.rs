use crate::config::SessionConfig;
use crate::context::Context;
use crate::error::Result;
use crate::http::Response;
use crate::middleware::{Middleware, Next};
use crate::session::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Loads the client's session before the chain and saves it after
///
/// The save runs whatever the inner chain did: handler errors, redirects
/// and other short-circuits all still persist session writes and send the
/// cookie back.
#[derive(Clone)]
pub struct SessionMiddleware {
    store: SessionStore,
    config: SessionConfig,
}

impl SessionMiddleware {
    pub fn new(store: SessionStore, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Check if route is exempt from session handling
    fn is_route_exempt(&self, path: &str) -> bool {
        self.config
            .exempt_routes
            .iter()
            .any(|pattern| matches_pattern(path, pattern))
    }

    fn create_cookie(&self, session_id: &str) -> String {
        let mut cookie = format!("{}={}", self.config.cookie_name, session_id);

        cookie.push_str(&format!("; Path={}", self.config.path));

        if self.config.secure {
            cookie.push_str("; Secure");
        }

        if self.config.http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie.push_str(&format!("; SameSite={}", self.config.same_site));
        cookie.push_str(&format!("; Max-Age={}", self.config.idle_timeout));

        cookie
    }
}

/// Exact path, or `prefix/*` for the prefix itself and anything below it
fn matches_pattern(path: &str, pattern: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(prefix) => path
            .strip_prefix(prefix)
            .map(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(false),
        None => path == pattern,
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        if !self.config.enabled || self.is_route_exempt(ctx.req.path()) {
            return next.run(ctx).await;
        }

        let cookie = ctx.req.cookie(&self.config.cookie_name);
        let session = Arc::new(self.store.load(cookie.as_deref()).await);
        ctx.attach_session(Arc::clone(&session), self.store.clone());

        let result = next.run(ctx).await;

        if let Err(e) = self.store.save(&session).await {
            log::error!("Failed to save session {}: {}", session.id(), e);
            return result.and(Err(e));
        }

        let cookie = self.create_cookie(session.id());
        ctx.res
            .get_or_insert_with(Response::ok)
            .add_header("Set-Cookie", &cookie);

        result
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
