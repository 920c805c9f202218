//! HTTP/1.1 server component

use crate::handler::Handler;
use crate::registry::ServerComponent;
use crate::tls::TlsAcceptor;
use async_trait::async_trait;
use baton_core::{Error, ListenerDescriptor, Result, TransportMode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

/// HTTP server serving one handler on every declared listener
pub struct HttpServer {
    name: String,
    descriptors: Vec<ListenerDescriptor>,
    handler: Arc<dyn Handler>,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
    connections: TaskTracker,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("name", &self.name)
            .field("descriptors", &self.descriptors)
            .field("tls", &self.tls.is_some())
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl HttpServer {
    /// Create a server with no listeners yet
    pub fn new(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            descriptors: Vec::new(),
            handler,
            tls: None,
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    /// Declare a listener
    pub fn listen(mut self, descriptor: ListenerDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Enable secure-mode listeners
    pub fn tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }
}

#[async_trait]
impl ServerComponent for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptors(&self) -> Vec<ListenerDescriptor> {
        self.descriptors.clone()
    }

    async fn serve(&self, mode: TransportMode, listener: TcpListener) -> Result<()> {
        let tls = match (mode, &self.tls) {
            (TransportMode::Plain, _) => None,
            (TransportMode::Secure, Some(acceptor)) => Some(acceptor.clone()),
            (TransportMode::Secure, None) => {
                return Err(Error::Config(format!(
                    "server '{}' has a secure listener but no TLS acceptor",
                    self.name
                )))
            }
        };

        let local_addr = listener.local_addr()?;
        info!(server = %self.name, %mode, address = %local_addr, "Server listening");

        loop {
            let (stream, peer) = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(server = %self.name, error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };
            trace!(server = %self.name, %peer, "Accepted connection");

            let handler = Arc::clone(&self.handler);
            let shutdown = self.shutdown.clone();
            match &tls {
                None => {
                    self.connections
                        .spawn(serve_connection(stream, handler, shutdown));
                }
                Some(acceptor) => {
                    let acceptor = acceptor.clone();
                    self.connections.spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, handler, shutdown).await,
                            Err(e) => debug!(%peer, error = %e, "TLS handshake failed"),
                        }
                    });
                }
            }
        }

        info!(server = %self.name, address = %local_addr, "Server stopped accepting");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        self.connections.close();
        info!(
            server = %self.name,
            open_connections = self.connections.len(),
            "Waiting for open connections"
        );
        self.connections.wait().await;
        Ok(())
    }
}

async fn serve_connection<IO>(io: IO, handler: Arc<dyn Handler>, shutdown: CancellationToken)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let handler = Arc::clone(&handler);
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(error = %e, "Connection closed with error");
    }
}
