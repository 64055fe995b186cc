use super::Response;
use crate::error::{Error, Result};
use crate::routing::Router;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Server as HyperServer};
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::pin::Pin;
use std::sync::Arc;

type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Hyper front-end for a fully registered [`Router`]
///
/// The router is frozen behind an `Arc` before the first connection is
/// accepted, so the route table is read-only for the server's lifetime.
/// In-flight requests finish before [`Server::serve`] returns.
pub struct Server {
    router: Arc<Router>,
    shutdown: ShutdownSignal,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self::from_arc(Arc::new(router))
    }

    /// Serve a shared router, stopping on SIGINT or SIGTERM
    pub fn from_arc(router: Arc<Router>) -> Self {
        Self {
            router,
            shutdown: Box::pin(os_shutdown_signal()),
        }
    }

    /// Stop accepting connections when `signal` resolves
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown = Box::pin(signal);
        self
    }

    /// Bind `addr` (`host:port`) and serve until shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::config(format!("Invalid address '{}': {}", addr, e)))?;
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::Io(e).with_context(format!("Failed to bind {}", addr)))?;

        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!(
            "rustf-dispatch listening on {} ({} routes)",
            local_addr,
            self.router.route_count()
        );

        let router = self.router;
        let make_svc = make_service_fn(move |_conn| {
            let router = Arc::clone(&router);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| respond(Arc::clone(&router), req)))
            }
        });

        HyperServer::from_tcp(listener)?
            .serve(make_svc)
            .with_graceful_shutdown(self.shutdown)
            .await?;

        log::info!("Stopped listening on {}", local_addr);
        Ok(())
    }
}

/// One hyper request through the router; never fails at the service level
async fn respond(
    router: Arc<Router>,
    req: hyper::Request<Body>,
) -> std::result::Result<hyper::Response<Body>, Infallible> {
    let response = match router.handle(req).await {
        Ok(response) => response,
        Err(e) => {
            log::warn!("Could not read request: {}", e);
            Response::error(e.status_code(), "Request could not be read")
        }
    };
    Ok(response.into_hyper())
}

/// Resolves on the first SIGINT or SIGTERM (Ctrl+C off unix)
///
/// If no handler can be installed the future never resolves, so the server
/// keeps running rather than stopping at once.
async fn os_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => log::info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => log::info!("Received SIGINT, shutting down"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to install signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
