use crate::config::AppConfig;
use crate::error::Result;
use crate::http::Server;
use crate::middleware::builtin::{LoggingMiddleware, SessionMiddleware};
use crate::routing::Router;
use crate::session::{MemorySessionStorage, SessionStore};
use crate::views::ViewEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Application wiring built from [`AppConfig`]
///
/// Owns the router while routes are registered. [`App::serve`] consumes
/// the app, so no registration can happen once traffic is accepted.
pub struct App {
    router: Router,
    sessions: SessionStore,
    views: Option<Arc<ViewEngine>>,
    config: Arc<AppConfig>,
}

impl App {
    /// Build views, sessions and the router with its global middleware
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let views = if Path::new(&config.views.directory).is_dir() {
            log::info!("Loading views from {}", config.views.directory);
            Some(Arc::new(ViewEngine::from_config(&config.views)?))
        } else {
            log::info!(
                "Views directory '{}' not found, rendering is disabled",
                config.views.directory
            );
            None
        };

        let idle_timeout = Duration::from_secs(config.session.idle_timeout);
        let storage = MemorySessionStorage::with_timeout(idle_timeout, Duration::from_secs(5 * 60));
        let sessions = SessionStore::with_timeout(Arc::new(storage), idle_timeout);

        let mut router = Router::new().with_csrf(config.csrf.clone());
        if let Some(views) = &views {
            router = router.with_views(Arc::clone(views));
        }

        router.use_middleware(Arc::new(LoggingMiddleware::new()));
        if config.session.enabled {
            router.use_middleware(Arc::new(SessionMiddleware::new(
                sessions.clone(),
                config.session.clone(),
            )));
        }

        if config.static_files.enabled {
            router.serve_files(&config.static_files.url_prefix, &config.static_files.directory)?;
            log::debug!(
                "Configured static files: {} -> {}",
                config.static_files.url_prefix,
                config.static_files.directory
            );
        }

        Ok(Self {
            router,
            sessions,
            views,
            config: Arc::new(config),
        })
    }

    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(AppConfig::from_file(config_path)?)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn views(&self) -> Option<&Arc<ViewEngine>> {
        self.views.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Freeze the router and serve on the configured address
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.server_address();
        Server::new(self.router).serve(&addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::http::Request;
    use crate::routing::BoxFuture;
    use hyper::StatusCode;
    use serde_json::json;
    use std::fs;

    fn welcome(ctx: &mut Context) -> BoxFuture<'_> {
        Box::pin(async move { ctx.view("welcome", json!({"name": "Sam"}), "") })
    }

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.views.directory = dir.join("views").to_string_lossy().into_owned();
        config.static_files.directory = dir.join("public").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_app_wires_views_sessions_and_static_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("views/layouts")).unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::write(dir.path().join("views/welcome.hbs"), "Hi {{name}}").unwrap();
        fs::write(
            dir.path().join("views/layouts/app.hbs"),
            "<body>{{{content}}}</body>",
        )
        .unwrap();
        fs::write(dir.path().join("public/site.js"), "console.log(1)").unwrap();

        let mut app = App::from_config(config_in(dir.path())).unwrap();
        assert!(app.views().is_some());
        app.router_mut().get("/", welcome, vec![]).unwrap();

        let router = app.into_router();
        let res = router.dispatch(Request::new("GET", "/")).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string(), "<body>Hi Sam</body>");
        assert!(res
            .header("Set-Cookie")
            .unwrap()
            .starts_with("rustf_session="));

        let res = router.dispatch(Request::new("GET", "/static/site.js")).await;
        assert_eq!(res.body_string(), "console.log(1)");
    }

    #[tokio::test]
    async fn test_missing_views_directory_disables_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.session.enabled = false;
        config.static_files.enabled = false;

        let mut app = App::from_config(config).unwrap();
        assert!(app.views().is_none());
        app.router_mut().get("/", welcome, vec![]).unwrap();

        let res = app.router().dispatch(Request::new("GET", "/")).await;
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("Set-Cookie"), None);
        assert_eq!(app.router().route_count(), 1);
    }
}
