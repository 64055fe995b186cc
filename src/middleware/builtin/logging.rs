//! Request logging middleware
//!
//! Logs `→ METHOD path` on the way in and `← METHOD path STATUS in Nms` on
//! the way out. Registered globally it wraps everything else, so the
//! timing covers session handling, CSRF checks and the handler.
//!
//! Use `RUST_LOG=warn` (or the backend's equivalent) in production to
//! silence it; the formatting work is skipped when info is disabled.

use crate::context::Context;
use crate::error::Result;
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use std::time::Instant;

/// HTTP request logging middleware
///
/// # Example
///
/// ```rust,ignore
/// use rustf_dispatch::middleware::builtin::LoggingMiddleware;
///
/// router.use_middleware(Arc::new(LoggingMiddleware::new()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        if !log::log_enabled!(log::Level::Info) {
            return next.run(ctx).await;
        }

        let started = Instant::now();
        log::info!(
            "→ {} {} from {}",
            ctx.req.method,
            ctx.req.uri,
            ctx.req.client_ip()
        );

        let result = next.run(ctx).await;

        let status = match (&result, ctx.res.as_ref()) {
            (Err(e), _) => e.status_code(),
            (Ok(()), Some(res)) => res.status.as_u16(),
            (Ok(()), None) => 200,
        };
        log::info!(
            "← {} {} {} in {}ms",
            ctx.req.method,
            ctx.req.uri,
            status,
            started.elapsed().as_millis()
        );

        result
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::Request;
    use crate::routing::{BoxFuture, RouteHandler};
    use std::sync::Arc;

    fn ok(ctx: &mut Context) -> BoxFuture<'_> {
        Box::pin(async move { ctx.text("ok") })
    }

    fn failing(_ctx: &mut Context) -> BoxFuture<'_> {
        Box::pin(async { Err(Error::internal("boom")) })
    }

    #[tokio::test]
    async fn test_passes_result_through() {
        let chain = vec![Arc::new(LoggingMiddleware::new()) as Arc<dyn Middleware>];

        let handler = ok as RouteHandler;
        let mut ctx = Context::new(Request::new("GET", "/ping"), None);
        Next::new(&chain, &handler).run(&mut ctx).await.unwrap();
        assert_eq!(ctx.take_response().unwrap().body_string(), "ok");

        let handler = failing as RouteHandler;
        let mut ctx = Context::new(Request::new("GET", "/ping"), None);
        let err = Next::new(&chain, &handler).run(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
