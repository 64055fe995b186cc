//! Authentication middleware
//!
//! [`Authenticate`] resolves the current user once per request. The gate
//! middleware ([`RequireAuth`], [`RequireRole`]) then read it and redirect
//! instead of calling the handler.

use crate::auth::{AuthUser, CurrentUser};
use crate::context::{Context, AUTH_SESSION_KEY};
use crate::error::Result;
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;

/// Resolves the user making a request
#[async_trait]
pub trait UserProvider: Send + Sync + 'static {
    async fn resolve(&self, ctx: &Context) -> Result<Option<AuthUser>>;
}

/// Reads the user record stored by [`Context::login`]
#[derive(Debug, Clone, Default)]
pub struct SessionUserProvider;

#[async_trait]
impl UserProvider for SessionUserProvider {
    async fn resolve(&self, ctx: &Context) -> Result<Option<AuthUser>> {
        Ok(ctx
            .session()
            .and_then(|session| session.get::<AuthUser>(AUTH_SESSION_KEY)))
    }
}

/// Sets `ctx.user` from a provider and always continues
pub struct Authenticate<P = SessionUserProvider> {
    provider: P,
}

impl Authenticate<SessionUserProvider> {
    pub fn from_session() -> Self {
        Self::new(SessionUserProvider)
    }
}

impl<P: UserProvider> Authenticate<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: UserProvider> Middleware for Authenticate<P> {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        let user = match self.provider.resolve(ctx).await {
            Ok(user) => user,
            Err(e) => {
                log::warn!("User lookup failed, continuing as guest: {}", e);
                None
            }
        };
        ctx.set_user(CurrentUser::from(user));

        next.run(ctx).await
    }

    fn name(&self) -> &'static str {
        "authenticate"
    }
}

/// Redirects guests to the login page
#[derive(Debug, Clone)]
pub struct RequireAuth {
    login_path: String,
}

impl Default for RequireAuth {
    fn default() -> Self {
        Self::new("/login")
    }
}

impl RequireAuth {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }
}

#[async_trait]
impl Middleware for RequireAuth {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        if ctx.guest() {
            log::debug!("Guest denied {}, redirecting to {}", ctx.req.path(), self.login_path);
            return redirect_uncached(ctx, &self.login_path);
        }
        next.run(ctx).await
    }

    fn name(&self) -> &'static str {
        "require_auth"
    }
}

/// Lets through only users holding a role
#[derive(Debug, Clone)]
pub struct RequireRole {
    role: String,
    login_path: String,
    redirect_to: String,
}

impl RequireRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            login_path: "/login".to_string(),
            redirect_to: "/".to_string(),
        }
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = path.into();
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }
}

#[async_trait]
impl Middleware for RequireRole {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        let allowed = match ctx.auth() {
            None => return redirect_uncached(ctx, &self.login_path),
            Some(user) => user.has_role(&self.role),
        };

        if !allowed {
            log::debug!("Missing role '{}' for {}", self.role, ctx.req.path());
            return redirect_uncached(ctx, &self.redirect_to);
        }
        next.run(ctx).await
    }

    fn name(&self) -> &'static str {
        "require_role"
    }
}

fn redirect_uncached(ctx: &mut Context, location: &str) -> Result<()> {
    ctx.redirect(location)?;
    ctx.add_header("Cache-Control", "no-cache, no-store, must-revalidate");
    ctx.add_header("Pragma", "no-cache");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::{Request, Response};
    use crate::routing::{BoxFuture, RouteHandler};
    use crate::session::{Session, SessionStore};
    use hyper::StatusCode;
    use std::sync::Arc;

    struct Fixed(Option<AuthUser>);

    #[async_trait]
    impl UserProvider for Fixed {
        async fn resolve(&self, _ctx: &Context) -> Result<Option<AuthUser>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl UserProvider for Broken {
        async fn resolve(&self, _ctx: &Context) -> Result<Option<AuthUser>> {
            Err(Error::internal("directory offline"))
        }
    }

    fn dashboard(ctx: &mut Context) -> BoxFuture<'_> {
        Box::pin(async move { ctx.text("dashboard") })
    }

    async fn run(chain: Vec<Arc<dyn Middleware>>, ctx: &mut Context) -> Response {
        let handler = dashboard as RouteHandler;
        Next::new(&chain, &handler).run(ctx).await.unwrap();
        ctx.take_response().unwrap()
    }

    fn mw(middleware: impl Middleware) -> Arc<dyn Middleware> {
        Arc::new(middleware)
    }

    fn admin() -> AuthUser {
        AuthUser::new(1, "Ada", "ada@example.com").with_role("admin")
    }

    #[tokio::test]
    async fn test_guest_redirected_without_cache() {
        let mut ctx = Context::new(Request::new("GET", "/dashboard"), None);
        let res = run(
            vec![mw(Authenticate::new(Fixed(None))), mw(RequireAuth::default())],
            &mut ctx,
        )
        .await;

        assert_eq!(res.status, StatusCode::FOUND);
        assert_eq!(res.header("Location"), Some("/login"));
        assert_eq!(res.header("Cache-Control"), Some("no-cache, no-store, must-revalidate"));
        assert_eq!(res.header("Pragma"), Some("no-cache"));
    }

    #[tokio::test]
    async fn test_authenticated_user_passes() {
        let mut ctx = Context::new(Request::new("GET", "/dashboard"), None);
        let res = run(
            vec![
                mw(Authenticate::new(Fixed(Some(admin())))),
                mw(RequireAuth::default()),
                mw(RequireRole::new("admin")),
            ],
            &mut ctx,
        )
        .await;

        assert_eq!(res.body_string(), "dashboard");
        assert_eq!(ctx.id(), Some(1));
    }

    #[tokio::test]
    async fn test_missing_role_redirects() {
        let user = AuthUser::new(2, "Bo", "bo@example.com");
        let mut ctx = Context::new(Request::new("GET", "/admin"), None);
        let res = run(
            vec![
                mw(Authenticate::new(Fixed(Some(user)))),
                mw(RequireRole::new("admin").redirect_to("/home")),
            ],
            &mut ctx,
        )
        .await;

        assert_eq!(res.header("Location"), Some("/home"));

        let mut ctx = Context::new(Request::new("GET", "/admin"), None);
        let res = run(vec![mw(RequireRole::new("admin"))], &mut ctx).await;
        assert_eq!(res.header("Location"), Some("/login"));
    }

    #[tokio::test]
    async fn test_provider_failure_means_guest() {
        let mut ctx = Context::new(Request::new("GET", "/"), None);
        let res = run(vec![mw(Authenticate::new(Broken))], &mut ctx).await;

        assert_eq!(res.body_string(), "dashboard");
        assert!(ctx.guest());
    }

    #[tokio::test]
    async fn test_session_provider_reads_login() {
        let session = Arc::new(Session::new("sid"));
        let mut ctx = Context::new(Request::new("GET", "/"), None);
        ctx.attach_session(Arc::clone(&session), SessionStore::memory());
        ctx.login(admin()).unwrap();

        let mut next_ctx = Context::new(Request::new("GET", "/"), None);
        next_ctx.attach_session(session, SessionStore::memory());
        run(vec![mw(Authenticate::from_session())], &mut next_ctx).await;

        assert!(next_ctx.check());
        assert_eq!(next_ctx.auth().map(|u| u.name.as_str()), Some("Ada"));
    }
}
