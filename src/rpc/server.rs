//! RPC service registration and serving.
//!
//! A service is any type implementing [`RpcService`]: a name plus a table of
//! methods. The server mounts every method of every registered service on one
//! axum router and serves it until its cancellation token fires.

use super::protocol::{method_path, qualified};
use crate::error::{MqError, Result};

use axum::Router;
use axum::routing::MethodRouter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A type whose methods are callable as `<NAME>.<Method>`.
pub trait RpcService: Send + Sync + 'static {
    const NAME: &'static str;

    /// Method name to handler table.
    fn methods(self: Arc<Self>) -> Vec<(&'static str, MethodRouter)>;
}

#[derive(Default)]
pub struct RpcServer {
    services: HashSet<String>,
    router: Router,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts the methods of `service`.
    ///
    /// Fails when the name is empty or already taken, or when the service has no
    /// methods or repeats one.
    pub fn register<S: RpcService>(&mut self, service: Arc<S>) -> Result<()> {
        if S::NAME.is_empty() {
            return Err(MqError::Registration("service name is empty".to_string()));
        }
        if self.services.contains(S::NAME) {
            return Err(MqError::Registration(format!(
                "service already defined: {}",
                S::NAME
            )));
        }

        let methods = service.methods();
        if methods.is_empty() {
            return Err(MqError::Registration(format!(
                "service {} has no methods",
                S::NAME
            )));
        }

        let mut seen = HashSet::new();
        for (method, _) in &methods {
            if !seen.insert(*method) {
                return Err(MqError::Registration(format!(
                    "method {} registered twice",
                    qualified(S::NAME, method)
                )));
            }
        }

        let mut router = std::mem::take(&mut self.router);
        for (method, handler) in methods {
            let name = qualified(S::NAME, method);
            tracing::debug!("Registered rpc method {}", name);
            router = router.route(&method_path(&name), handler);
        }
        self.router = router;
        self.services.insert(S::NAME.to_string());

        Ok(())
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Accepts connections on `listener` until `shutdown` is cancelled.
    ///
    /// The listener is dropped as soon as the token fires, so new connections are
    /// refused from then on.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        let addr = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        match result {
            Ok(()) => tracing::info!("RPC listener on {} closed", addr),
            Err(e) => tracing::error!("RPC listener on {} failed: {}", addr, e),
        }
    }
}
