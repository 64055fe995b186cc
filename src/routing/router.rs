use super::pattern::CompiledPattern;
use super::static_files::StaticFiles;
use super::table::{Method, Route, RouteTable};
use super::{Handler, RouteHandler};
use crate::config::CsrfConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::middleware::builtin::CsrfGuard;
use crate::middleware::{Middleware, Next};
use crate::views::ViewEngine;
use hyper::{Body, Request as HyperRequest};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Whether a registration gets the CSRF guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsrfPolicy {
    /// Guard state-changing verbs unless the path starts with an exempt prefix
    #[default]
    Auto,
    /// Never add the guard
    Skip,
    /// Always add the guard
    Force,
}

/// Route registration and dispatch
///
/// A root router owns the route table and the global middleware list.
/// [`Router::group`] returns a router that shares both, adds a path prefix
/// and carries its own scoped middleware. Scoped middleware is copied into
/// each route registered through the group, so mutating a group never
/// affects its parent.
pub struct Router {
    table: Arc<RwLock<RouteTable>>,
    globals: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
    scope: Vec<Arc<dyn Middleware>>,
    prefix: String,
    is_group: bool,
    csrf: Arc<CsrfGuard>,
    views: Option<Arc<ViewEngine>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(RouteTable::new())),
            globals: Arc::new(RwLock::new(Vec::new())),
            scope: Vec::new(),
            prefix: String::new(),
            is_group: false,
            csrf: Arc::new(CsrfGuard::new()),
            views: None,
        }
    }

    /// Attach the view engine handed to every request context
    pub fn with_views(mut self, views: Arc<ViewEngine>) -> Self {
        self.views = Some(views);
        self
    }

    /// Replace the CSRF guard configuration
    pub fn with_csrf(mut self, config: CsrfConfig) -> Self {
        self.csrf = Arc::new(CsrfGuard::with_config(config));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn route_count(&self) -> usize {
        read_lock(&self.table).len()
    }

    // Registration

    pub fn add_route(
        &self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(method, pattern, handler, middlewares, CsrfPolicy::Auto)
    }

    pub fn add_route_with_policy(
        &self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
        policy: CsrfPolicy,
    ) -> Result<()> {
        let effective = format!("{}{}", self.prefix, pattern);
        let compiled = CompiledPattern::compile(&effective)?;

        let guarded = match policy {
            CsrfPolicy::Auto => {
                method.is_state_changing() && !self.csrf.config().is_exempt(&effective)
            }
            CsrfPolicy::Skip => false,
            CsrfPolicy::Force => true,
        };

        let mut chain = self.scope.clone();
        if guarded {
            chain.push(Arc::clone(&self.csrf) as Arc<dyn Middleware>);
        }
        chain.extend(middlewares);

        log::debug!(
            "Registered {} {} ({} middleware{})",
            method,
            effective,
            chain.len(),
            if guarded { ", csrf" } else { "" }
        );

        self.table
            .write()
            .map_err(|_| Error::internal("Route table lock poisoned"))?
            .push(Route::new(method, compiled, handler, chain));
        Ok(())
    }

    pub fn get(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Get, pattern, Arc::new(handler), middlewares)
    }

    pub fn post(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Post, pattern, Arc::new(handler), middlewares)
    }

    pub fn put(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Put, pattern, Arc::new(handler), middlewares)
    }

    pub fn patch(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Patch, pattern, Arc::new(handler), middlewares)
    }

    pub fn delete(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Delete, pattern, Arc::new(handler), middlewares)
    }

    pub fn options(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Options, pattern, Arc::new(handler), middlewares)
    }

    pub fn head(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route(Method::Head, pattern, Arc::new(handler), middlewares)
    }

    // Explicit CSRF variants

    pub fn post_no_csrf(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(
            Method::Post,
            pattern,
            Arc::new(handler),
            middlewares,
            CsrfPolicy::Skip,
        )
    }

    pub fn put_no_csrf(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(
            Method::Put,
            pattern,
            Arc::new(handler),
            middlewares,
            CsrfPolicy::Skip,
        )
    }

    pub fn patch_no_csrf(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(
            Method::Patch,
            pattern,
            Arc::new(handler),
            middlewares,
            CsrfPolicy::Skip,
        )
    }

    pub fn post_force_csrf(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(
            Method::Post,
            pattern,
            Arc::new(handler),
            middlewares,
            CsrfPolicy::Force,
        )
    }

    pub fn put_force_csrf(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(
            Method::Put,
            pattern,
            Arc::new(handler),
            middlewares,
            CsrfPolicy::Force,
        )
    }

    pub fn patch_force_csrf(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.add_route_with_policy(
            Method::Patch,
            pattern,
            Arc::new(handler),
            middlewares,
            CsrfPolicy::Force,
        )
    }

    /// Register the same handler under every verb
    ///
    /// Each verb gets its own route and the automatic CSRF policy, so the
    /// POST/PUT/PATCH entries are guarded like any other registration.
    pub fn any(
        &self,
        pattern: &str,
        handler: RouteHandler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        for method in Method::ALL {
            self.add_route(method, pattern, Arc::clone(&handler), middlewares.clone())?;
        }
        Ok(())
    }

    /// Serve files from `dir` under `prefix/:filepath`
    pub fn serve_files(&self, prefix: &str, dir: impl Into<PathBuf>) -> Result<()> {
        let pattern = format!("{}/:filepath", prefix.trim_end_matches('/'));
        self.add_route(
            Method::Get,
            &pattern,
            Arc::new(StaticFiles::new(dir)),
            Vec::new(),
        )
    }

    pub fn serve_static(&self, prefix: &str, dir: impl Into<PathBuf>) -> Result<()> {
        self.serve_files(prefix, dir)
    }

    /// Create a sub-router with an extended prefix and extra middleware
    pub fn group(&self, prefix: &str, middlewares: Vec<Arc<dyn Middleware>>) -> Router {
        let mut scope = self.scope.clone();
        scope.extend(middlewares);

        Router {
            table: Arc::clone(&self.table),
            globals: Arc::clone(&self.globals),
            scope,
            prefix: format!("{}{}", self.prefix, prefix),
            is_group: true,
            csrf: Arc::clone(&self.csrf),
            views: self.views.clone(),
        }
    }

    /// Append middleware
    ///
    /// On the root router this is global middleware, wrapped around every
    /// matched route at dispatch. On a group it applies to routes registered
    /// through that group from now on.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        if self.is_group {
            self.scope.push(middleware);
        } else {
            write_lock(&self.globals).push(middleware);
        }
    }

    // Dispatch

    /// Hyper entry point
    pub async fn handle(&self, req: HyperRequest<Body>) -> Result<Response> {
        let request = Request::from_hyper(req).await?;
        Ok(self.dispatch(request).await)
    }

    /// Match the request and run the wrapped handler
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let path = request.path().to_string();
        let method = request.method.clone();

        let found = read_lock(&self.table).find(&method, &path);
        let Some((route, params)) = found else {
            log::debug!("No route for {} {}", method, path);
            return Response::not_found();
        };

        request.params = params;
        let mut ctx = Context::new(request, self.views.clone());
        ctx.set_csrf_session_key(&self.csrf.config().session_key);

        let mut chain = read_lock(&self.globals).clone();
        chain.extend(route.middlewares.iter().cloned());

        match Next::new(&chain, route.handler.as_ref()).run(&mut ctx).await {
            Ok(()) => ctx.take_response().unwrap_or_else(Response::ok),
            Err(e) => {
                log::error!("{} {} failed: {}", method, path, e);
                error_response(&e, ctx.take_response())
            }
        }
    }
}

/// Error page that keeps cookies already set by middleware
fn error_response(error: &Error, partial: Option<Response>) -> Response {
    let status = error.status_code();
    let message = match status {
        500 => "Internal Server Error".to_string(),
        _ => error.to_string(),
    };

    let mut response = Response::error(status, &message);
    if let Some(partial) = partial {
        for (name, value) in partial.headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                response.add_header(&name, &value);
            }
        }
    }
    response
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
