use super::pattern::CompiledPattern;
use super::Handler;
use crate::middleware::Middleware;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// HTTP verbs a route can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Options,
        Method::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
        }
    }

    /// Parse a request method, case-insensitively
    pub fn parse(method: &str) -> Option<Method> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    /// Verbs that get the CSRF guard under the automatic policy
    pub fn is_state_changing(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered endpoint, immutable once in the table
pub struct Route {
    pub method: Method,
    pub pattern: CompiledPattern,
    pub handler: Arc<dyn Handler>,
    /// Effective route-level middleware, outermost first
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl Route {
    pub fn new(
        method: Method,
        pattern: CompiledPattern,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            method,
            pattern,
            handler,
            middlewares,
        }
    }

    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Ordered, append-only list of routes
///
/// Registration order is match precedence: the first route whose method and
/// pattern both match wins, even when a later route is more specific.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, route: Route) {
        self.routes.push(Arc::new(route));
    }

    /// First route matching `method` and the full `path`, with its params
    pub fn find(&self, method: &str, path: &str) -> Option<(Arc<Route>, HashMap<String, String>)> {
        let method = Method::parse(method)?;

        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route
                    .pattern
                    .captures(path)
                    .map(|params| (Arc::clone(route), params))
            })
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
