//! Graceful stop signal for the HTTP server.

use std::future::Future;

use tokio::sync::broadcast;

/// One-shot stop notification shared between [`Server::stop`] and the
/// serving task.
///
/// Each call to [`signal`](Self::signal) subscribes a fresh receiver, so a
/// stopped server can be started again without seeing the previous trigger.
///
/// [`Server::stop`]: crate::http::server::Server::stop
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Future resolving on the next [`trigger`](Self::trigger).
    pub fn signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.recv().await;
            tracing::info!("Server shutting down");
        }
    }

    /// Wake every pending [`signal`](Self::signal). Returns how many were waiting.
    pub fn trigger(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Serving tasks currently waiting for the signal.
    pub fn waiting(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
