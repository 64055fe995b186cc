//! Wrap-style middleware
//!
//! A middleware receives the request context and a [`Next`] cursor over the
//! rest of the chain. Calling `next.run(ctx).await` hands control inward;
//! code after that call runs on the way back out. Returning without calling
//! it short-circuits the chain, so neither the inner middleware nor the
//! handler runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use rustf_dispatch::prelude::*;
//!
//! struct Timing;
//!
//! #[async_trait]
//! impl Middleware for Timing {
//!     async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
//!         let started = std::time::Instant::now();
//!         let result = next.run(ctx).await;
//!         ctx.add_header("X-Response-Time", &format!("{}ms", started.elapsed().as_millis()));
//!         result
//!     }
//! }
//! ```

pub mod builtin;

use crate::context::Context;
use crate::error::Result;
use crate::routing::{BoxFuture, Handler};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()>;

    /// Name used in debug logs
    fn name(&self) -> &'static str {
        "unnamed"
    }
}

/// Function middleware, e.g. `fn audit<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a>`
pub type MiddlewareFn = for<'a> fn(&'a mut Context, Next<'a>) -> BoxFuture<'a>;

#[async_trait]
impl Middleware for MiddlewareFn {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        (*self)(ctx, next).await
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// Wrap a middleware function for registration
pub fn from_fn(f: MiddlewareFn) -> Arc<dyn Middleware> {
    Arc::new(f)
}

/// Cursor over the remaining middleware and the terminal handler
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn new(remaining: &'a [Arc<dyn Middleware>], handler: &'a dyn Handler) -> Self {
        Self { remaining, handler }
    }

    /// Run the rest of the chain
    pub async fn run(self, ctx: &mut Context) -> Result<()> {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                log::debug!("Entering middleware '{}'", current.name());
                current
                    .handle(
                        ctx,
                        Next {
                            remaining: rest,
                            handler: self.handler,
                        },
                    )
                    .await
            }
            None => self.handler.call(ctx).await,
        }
    }
}

/// A middleware list composed around a terminal handler
///
/// The first listed middleware is the outermost wrapper: it runs first on
/// the way in and last on the way out.
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>, handler: Arc<dyn Handler>) -> Self {
        Self {
            middlewares,
            handler,
        }
    }

    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        Next::new(&self.middlewares, self.handler.as_ref())
            .run(ctx)
            .await
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use crate::routing::RouteHandler;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
            self.trace.lock().unwrap().push(format!("{}-in", self.label));
            let result = next.run(ctx).await;
            self.trace.lock().unwrap().push(format!("{}-out", self.label));
            result
        }
    }

    struct Halt;

    #[async_trait]
    impl Middleware for Halt {
        async fn handle(&self, ctx: &mut Context, _next: Next<'_>) -> Result<()> {
            ctx.redirect("/login")
        }
    }

    fn handler(ctx: &mut Context) -> BoxFuture<'_> {
        Box::pin(async move {
            ctx.set("handled", true)?;
            ctx.text("done")
        })
    }

    fn tag<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            ctx.set("tagged", true)?;
            next.run(ctx).await
        })
    }

    fn recorder(label: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(Recorder {
            label,
            trace: Arc::clone(trace),
        })
    }

    #[tokio::test]
    async fn test_first_listed_is_outermost() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(
            vec![recorder("a", &trace), recorder("b", &trace)],
            Arc::new(handler as RouteHandler),
        );

        let mut ctx = Context::new(Request::new("GET", "/"), None);
        chain.run(&mut ctx).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["a-in", "b-in", "b-out", "a-out"]);
        assert_eq!(ctx.get::<bool>("handled"), Some(true));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_chain() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(
            vec![recorder("outer", &trace), Arc::new(Halt), recorder("inner", &trace)],
            Arc::new(handler as RouteHandler),
        );

        let mut ctx = Context::new(Request::new("GET", "/"), None);
        chain.run(&mut ctx).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["outer-in", "outer-out"]);
        assert_eq!(ctx.get::<bool>("handled"), None);
        let res = ctx.take_response().unwrap();
        assert_eq!(res.header("Location"), Some("/login"));
    }

    #[tokio::test]
    async fn test_function_middleware() {
        let chain = MiddlewareChain::new(vec![from_fn(tag)], Arc::new(handler as RouteHandler));

        let mut ctx = Context::new(Request::new("GET", "/"), None);
        chain.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.get::<bool>("tagged"), Some(true));
        assert_eq!(ctx.get::<bool>("handled"), Some(true));
    }

    #[test]
    fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::new(Vec::new(), Arc::new(handler as RouteHandler));
        assert!(chain.is_empty());

        let mut ctx = Context::new(Request::new("GET", "/"), None);
        tokio_test::block_on(chain.run(&mut ctx)).unwrap();
        assert_eq!(ctx.take_response().unwrap().body_string(), "done");
    }
}
