pub mod pattern;
pub mod router;
pub mod static_files;
pub mod table;

use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

pub use pattern::CompiledPattern;
pub use router::{CsrfPolicy, Router};
pub use static_files::StaticFiles;
pub use table::{Method, Route, RouteTable};

/// Boxed future returned by handlers and function middleware
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

// Type alias for route handlers - modifies Context in place
pub type RouteHandler = for<'a> fn(&'a mut Context) -> BoxFuture<'a>;

/// Terminal step of a middleware chain
///
/// Plain functions matching [`RouteHandler`] implement it, as does
/// [`StaticFiles`]. Implement it directly for handlers that carry state.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: &mut Context) -> Result<()>;
}

#[async_trait]
impl Handler for RouteHandler {
    async fn call(&self, ctx: &mut Context) -> Result<()> {
        (*self)(ctx).await
    }
}
