use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use super::backend::Backend;
use super::buffer_cache::MessageBufferCache;
use super::route_pool::RoutePool;
use super::task_registry::TaskRegistry;
use super::{expiry, stats_engine};
use crate::telemetry::TelemetryHistory;
use crate::utils::error::{PoolError, Result};

/// The single long-lived task that drives expiry and statistics.
///
/// Grounded on the teacher's `BatchWriter::start`: a `tokio::spawn`'d loop
/// guarded by `tokio::select!` against a ticker and a shutdown `Notify`,
/// holding an `Arc` back-reference to everything the loop body needs rather
/// than a bag of globals.
pub struct PeriodicDriver {
    routes: Arc<RoutePool>,
    backend: Arc<dyn Backend>,
    buffers: Arc<MessageBufferCache>,
    tasks: Arc<TaskRegistry>,
    telemetry: Arc<TelemetryHistory>,
    stats_interval: u64,
    log_stats: bool,
    is_shared: bool,
    stop: Arc<Notify>,
}

impl PeriodicDriver {
    pub fn new(
        routes: Arc<RoutePool>,
        backend: Arc<dyn Backend>,
        buffers: Arc<MessageBufferCache>,
        tasks: Arc<TaskRegistry>,
        telemetry: Arc<TelemetryHistory>,
        stats_interval: u64,
        log_stats: bool,
        is_shared: bool,
    ) -> PeriodicDriver {
        PeriodicDriver {
            routes,
            backend,
            buffers,
            tasks,
            telemetry,
            stats_interval: stats_interval.max(1),
            log_stats,
            is_shared,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Spawn the driver loop. Per spec.md §4.5, the loop itself has no
    /// cancellation path by default; a `stop()` is exposed additively (see
    /// DESIGN.md decision 2) for embedders that want graceful shutdown
    /// without relying on process exit.
    ///
    /// Returns a [`PoolError::Spawn`] if called outside a Tokio runtime
    /// context — the nearest real analogue this crate has to the source's
    /// `machine_coroutine_create` failure path, since `tokio::spawn` itself
    /// cannot fail to enqueue.
    pub fn start(self) -> Result<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| PoolError::Spawn)?;
        let stop = self.stop.clone();
        Ok(handle.spawn(async move {
            let _guard = self.tasks.enter();
            let mut tick: u64 = 0;
            loop {
                tokio::select! {
                    _ = sleep(Duration::from_millis(1000)) => {}
                    _ = stop.notified() => {
                        tracing::debug!(target: "expire", "periodic driver stopping");
                        break;
                    }
                }

                expiry::run_tick(
                    &self.routes,
                    self.backend.as_ref(),
                    &self.buffers,
                    &self.telemetry,
                    &self.tasks,
                    self.is_shared,
                )
                .await;

                tick += 1;
                if tick >= self.stats_interval {
                    tick = 0;
                    stats_engine::run_stats_pass(
                        &self.routes,
                        self.stats_interval,
                        self.log_stats,
                        &self.buffers,
                        &self.tasks,
                        &self.telemetry,
                    )
                    .await;
                }
            }
        }))
    }

    /// Signal the running loop to exit after its current sleep/tick. Has no
    /// effect if the loop hasn't been started, or has already stopped.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }
}
