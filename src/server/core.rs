use log::{error, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::client::handle_client;
use crate::error::StartupError;
use crate::middleware::logging::log_connection;
use crate::server::config::ServerConfig;
use crate::server::context::ServerContext;
use crate::storage::ServerRoot;

pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl Server {
    /// Validates the configuration, opens the server root and binds the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, StartupError> {
        config.validate()?;

        let root = ServerRoot::new(config.directory_path())?;
        info!("Server root directory: {}", root.path().display());

        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            error!("Failed to bind to {}: {}", addr, source);
            StartupError::Bind { addr, source }
        })?;
        if let Ok(bound) = listener.local_addr() {
            info!("Server bound to {}", bound);
        }

        Ok(Self {
            listener,
            context: Arc::new(ServerContext::new(root, config)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Each connection runs on its own task, so the accept loop never waits
    /// on a client. Connections still in flight at shutdown are dropped with
    /// the runtime.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Serving {} on {}",
            self.context.root.path().display(),
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".into())
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        log_connection(&addr);
                        let context = Arc::clone(&self.context);

                        // Spawn a task for each client so accept loop doesn't block
                        tokio::spawn(async move {
                            handle_client(stream, addr, context).await;
                        });
                    }
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                    }
                },
            }
        }
    }

    /// Accepts connections forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }
}
