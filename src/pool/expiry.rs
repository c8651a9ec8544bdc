use std::sync::Arc;

use super::backend::Backend;
use super::buffer_cache::MessageBufferCache;
use super::route_pool::RoutePool;
use super::server::Server;
use super::task_registry::TaskRegistry;
use crate::telemetry::{TelemetryHistory, TelemetrySeverity};

/// Runs one mark/sweep pass over every route in `routes`.
///
/// Mark and sweep are strictly sequential phases across the whole pool:
/// every route is marked before any route is swept, matching spec.md
/// §4.3's "two strict phases per tick" (not two phases per route).
pub async fn run_tick(
    routes: &RoutePool,
    backend: &dyn Backend,
    buffers: &MessageBufferCache,
    telemetry: &TelemetryHistory,
    tasks: &TaskRegistry,
    is_shared: bool,
) {
    mark(routes);
    sweep(routes, backend, buffers, telemetry, tasks, is_shared).await;
    for id in routes.reap_obsolete_drained() {
        telemetry
            .record_event(
                TelemetrySeverity::Info,
                "expire",
                format!("route {}/{} (v{}) reaped: obsolete and fully drained", id.database, id.user, id.version),
                None,
            )
            .await;
    }
}

/// Mark phase: for every route, decide which idle servers become
/// candidates for expiry. Entirely synchronous — no `.await` anywhere in
/// this function or anything it calls, which is what gives callers the
/// "single non-suspending region" guarantee spec.md §4.3/§5 requires.
fn mark(routes: &RoutePool) {
    for route in routes.snapshot() {
        let obsolete_and_idle_clients = route.scheme.is_obsolete() && route.client_count() == 0;
        if obsolete_and_idle_clients {
            route.server_pool.force_expire_idle();
        } else {
            route.server_pool.mark_expired(route.scheme.pool_ttl());
        }
    }
}

/// Sweep phase: for every route, drain its expire bucket and tear each
/// server down. Each server has already been removed from its route's
/// buckets by `mark`, so nothing else can observe it mid-teardown even
/// though this function suspends repeatedly on backend I/O.
async fn sweep(
    routes: &RoutePool,
    backend: &dyn Backend,
    buffers: &MessageBufferCache,
    telemetry: &TelemetryHistory,
    tasks: &TaskRegistry,
    is_shared: bool,
) {
    for route in routes.snapshot() {
        let expired = route.server_pool.drain_expired();
        for server in expired {
            sweep_one(&server, &route.id, backend, buffers, telemetry, tasks, is_shared).await;
        }
    }
}

async fn sweep_one(
    server: &Arc<Server>,
    route_id: &super::route::RouteId,
    backend: &dyn Backend,
    buffers: &MessageBufferCache,
    telemetry: &TelemetryHistory,
    tasks: &TaskRegistry,
    is_shared: bool,
) {
    let _guard = tasks.enter();
    server.set_idle_time(0);
    server.clear_route();

    // spec.md §4.3 step 4 / §9: rebinding the I/O handle to the current
    // execution context is only meaningful in shared mode; in a
    // single-context deployment it's a pure no-op that shouldn't be called.
    if is_shared {
        backend.rebind(server).await.ok();
    }

    {
        let _buffer = buffers.attach();
        if let Err(err) = backend.terminate(server).await {
            tracing::debug!(target: "expire", server_id = server.id, error = %err, "terminate failed");
        }
    }

    if let Err(err) = backend.close(server).await {
        tracing::debug!(target: "expire", server_id = server.id, error = %err, "close failed");
    }

    tracing::debug!(target: "expire", server_id = server.id, "server closed");
    telemetry
        .record_event(
            TelemetrySeverity::Info,
            "expire",
            format!(
                "server {} closed (route {}/{})",
                server.id, route_id.database, route_id.user
            ),
            None,
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::backend::NullBackend;
    use crate::pool::route::RouteScheme;
    use crate::pool::server::Server;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn idle_server_crosses_ttl_after_enough_ticks() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 3);
        let server = Server::new(route.id.clone());
        route.server_pool.push_idle(server.clone());

        let backend = NullBackend::default();
        let buffers = MessageBufferCache::new();
        let telemetry = TelemetryHistory::new(64, 1);
        let tasks = TaskRegistry::new();

        for _ in 0..3 {
            run_tick(&routes, &backend, &buffers, &telemetry, &tasks, false).await;
            assert_eq!(route.server_pool.idle_count(), 1);
        }

        run_tick(&routes, &backend, &buffers, &telemetry, &tasks, false).await;
        assert_eq!(route.server_pool.idle_count(), 0);
        assert_eq!(route.server_pool.total_count(), 0);
        assert_eq!(backend.close_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn obsolete_route_with_no_clients_drains_in_one_tick() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 0);
        route
            .server_pool
            .push_idle(Server::new(route.id.clone()));
        route
            .server_pool
            .push_idle(Server::new(route.id.clone()));
        route.scheme.set_obsolete(true);

        let backend = NullBackend::default();
        let buffers = MessageBufferCache::new();
        let telemetry = TelemetryHistory::new(64, 1);
        let tasks = TaskRegistry::new();
        run_tick(&routes, &backend, &buffers, &telemetry, &tasks, false).await;

        assert_eq!(route.server_pool.total_count(), 0);
        assert!(routes.get(&route.id).is_none(), "route should be GC'd");
    }

    #[tokio::test]
    async fn obsolete_route_held_by_clients_keeps_idle_servers() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 0);
        route.add_client();
        route
            .server_pool
            .push_idle(Server::new(route.id.clone()));
        route.scheme.set_obsolete(true);

        let backend = NullBackend::default();
        let buffers = MessageBufferCache::new();
        let telemetry = TelemetryHistory::new(64, 1);
        let tasks = TaskRegistry::new();
        run_tick(&routes, &backend, &buffers, &telemetry, &tasks, false).await;

        assert_eq!(route.server_pool.idle_count(), 1);
        assert!(routes.get(&route.id).is_some());
    }

    #[tokio::test]
    async fn zero_ttl_leaves_idle_time_unchanged() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 0);
        let server = Server::new(route.id.clone());
        server.set_idle_time(1000);
        route.server_pool.push_idle(server.clone());

        let backend = NullBackend::default();
        let buffers = MessageBufferCache::new();
        let telemetry = TelemetryHistory::new(64, 1);
        let tasks = TaskRegistry::new();
        for _ in 0..5 {
            run_tick(&routes, &backend, &buffers, &telemetry, &tasks, false).await;
        }

        assert_eq!(server.idle_time(), 1000);
        assert_eq!(route.server_pool.idle_count(), 1);
    }

    #[test]
    fn route_scheme_pool_ttl_is_used_for_boundary() {
        let scheme = RouteScheme::new(5, false, 1);
        assert_eq!(scheme.pool_ttl(), 5);
    }

    #[tokio::test]
    async fn sweep_and_reap_each_record_a_telemetry_event() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 0);
        route
            .server_pool
            .push_idle(Server::new(route.id.clone()));
        route.scheme.set_obsolete(true);

        let backend = NullBackend::default();
        let buffers = MessageBufferCache::new();
        let telemetry = TelemetryHistory::new(64, 1);
        let tasks = TaskRegistry::new();
        run_tick(&routes, &backend, &buffers, &telemetry, &tasks, false).await;

        let events = telemetry.get_events().await;
        assert!(events.iter().any(|e| e.category == "expire" && e.message.contains("closed")));
        assert!(events.iter().any(|e| e.category == "expire" && e.message.contains("reaped")));
    }

    /// A backend whose `close` yields once, long enough for a concurrently
    /// running check to observe `TaskRegistry::active_count` mid-sweep.
    #[derive(Debug, Default)]
    struct YieldingBackend;

    #[async_trait::async_trait]
    impl Backend for YieldingBackend {
        async fn terminate(&self, _server: &Server) -> crate::utils::error::Result<()> {
            Ok(())
        }

        async fn close(&self, _server: &Server) -> crate::utils::error::Result<()> {
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn sweep_registers_in_flight_close_with_task_registry() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 0);
        route
            .server_pool
            .push_idle(Server::new(route.id.clone()));
        route.scheme.set_obsolete(true);

        let backend = Arc::new(YieldingBackend);
        let routes = Arc::new(routes);
        let buffers = Arc::new(MessageBufferCache::new());
        let telemetry = Arc::new(TelemetryHistory::new(64, 1));
        let tasks = Arc::new(TaskRegistry::new());

        assert_eq!(tasks.active_count(), 0);

        let (r, b, buf, t, ts) = (
            routes.clone(),
            backend.clone(),
            buffers.clone(),
            telemetry.clone(),
            tasks.clone(),
        );
        let handle = tokio::spawn(async move {
            run_tick(&r, b.as_ref(), &buf, &t, &ts, false).await;
        });

        // Let run_tick enter sweep_one and suspend inside close()'s yield_now.
        tokio::task::yield_now().await;
        assert_eq!(tasks.active_count(), 1, "sweep_one's guard must be held across the suspension");

        handle.await.unwrap();
        assert_eq!(tasks.active_count(), 0, "guard drops once the close completes");
    }
}
