//! HTTP server.
//!
//! # Responsibilities
//! - Validate and hold the listen address (ip, port)
//! - Bind the socket and serve the listener's router
//! - Stop gracefully on request
//!
//! # Design Decisions
//! - Configuring the server never touches the network; `run` binds
//! - Serving happens on a spawned task so `run` returns once listening
//! - Port `0` binds an ephemeral port; `local_addr` reports the real one

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::ServerError;
use crate::http::listener::HttpListener;
use crate::lifecycle::shutdown::Shutdown;

struct Serving {
    addr: SocketAddr,
    handle: JoinHandle<io::Result<()>>,
}

/// HTTP server bound to an [`HttpListener`].
///
/// Configured while idle, then started and stopped through the application.
pub struct Server {
    listener: Option<Arc<HttpListener>>,
    ip: Ipv4Addr,
    port: u16,
    shutdown: Shutdown,
    serving: Option<Serving>,
}

impl Server {
    /// Idle server on `127.0.0.1:3333` with no listener.
    pub fn new() -> Self {
        Self {
            listener: None,
            ip: Ipv4Addr::LOCALHOST,
            port: 3333,
            shutdown: Shutdown::new(),
            serving: None,
        }
    }

    /// Listener whose mounts become the server's router on start.
    pub fn set_request_listener(&mut self, listener: Arc<HttpListener>) {
        self.listener = Some(listener);
    }

    /// Accepts a dotted IPv4 address.
    pub fn set_ip(&mut self, ip: &str) -> Result<(), ServerError> {
        self.ip = ip.parse().map_err(|_| ServerError::BadIp(ip.to_string()))?;
        Ok(())
    }

    /// Accepts decimal digits only (`"3333"`, `"0"`).
    pub fn set_port(&mut self, port: &str) -> Result<(), ServerError> {
        let bad = || ServerError::BadPort(port.to_string());
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        self.port = port.parse().map_err(|_| bad())?;
        Ok(())
    }

    /// Configured bind address.
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Configured port; `0` lets the OS pick one.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True between a successful start and stop.
    pub fn is_running(&self) -> bool {
        self.serving.is_some()
    }

    /// Address actually bound, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.as_ref().map(|s| s.addr)
    }

    /// Bind the socket and start serving in the background.
    pub async fn run(&mut self) -> Result<SocketAddr, ServerError> {
        if self.serving.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let listener = self.listener.clone().ok_or(ServerError::NoRequestListener)?;

        let requested = SocketAddr::from((self.ip, self.port));
        let socket = TcpListener::bind(requested)
            .await
            .map_err(|e| ServerError::Bind {
                addr: requested,
                source: Arc::new(e),
            })?;
        let addr = socket.local_addr().map_err(|e| ServerError::Bind {
            addr: requested,
            source: Arc::new(e),
        })?;

        let router = listener.into_router();
        let signal = self.shutdown.signal();
        let handle = tokio::spawn(async move {
            axum::serve(socket, router)
                .with_graceful_shutdown(signal)
                .await
        });

        tracing::info!(address = %addr, "HTTP server listening");
        self.serving = Some(Serving { addr, handle });
        Ok(addr)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let serving = self.serving.take().ok_or(ServerError::NotRunning)?;
        self.shutdown.trigger();

        match serving.handle.await {
            Ok(Ok(())) => {
                tracing::info!(address = %serving.addr, "HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Serve(e.to_string())),
            Err(e) => Err(ServerError::Serve(e.to_string())),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("addr", &self.local_addr())
            .finish()
    }
}
