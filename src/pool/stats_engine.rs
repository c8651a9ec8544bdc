use super::route_pool::RoutePool;
use super::stats::{ServerStatsAvg, ServerStatsSnapshot};
use super::task_registry::TaskRegistry;
use super::buffer_cache::MessageBufferCache;
use crate::telemetry::{TelemetryHistory, TelemetrySeverity};

#[cfg(feature = "metrics")]
mod metrics {
    use lazy_static::lazy_static;
    use prometheus::{register_gauge_vec, GaugeVec};

    lazy_static! {
        pub static ref ROUTE_RPS: GaugeVec = register_gauge_vec!(
            "sqlpooler_route_rps",
            "Requests per second, averaged over the last stats interval",
            &["database", "user"]
        )
        .expect("metric registration");
        pub static ref ROUTE_QUERY_TIME_US: GaugeVec = register_gauge_vec!(
            "sqlpooler_route_query_time_us",
            "Average query time in microseconds over the last stats interval",
            &["database", "user"]
        )
        .expect("metric registration");
    }
}

/// Runs one statistics computation pass across every route. Called by the
/// periodic driver every `stats_interval` ticks, never on every tick.
///
/// Purely synchronous arithmetic over atomic loads and a commit into each
/// route's cached snapshot; the optional structured log emission at the end
/// is the only part of this function that can suspend, and it runs after
/// every route's state has already been committed (spec.md §5).
pub async fn run_stats_pass(
    routes: &RoutePool,
    stats_interval: u64,
    log_stats: bool,
    buffers: &MessageBufferCache,
    tasks: &TaskRegistry,
    telemetry: &TelemetryHistory,
) {
    if routes.is_empty() {
        return;
    }

    if log_stats {
        tracing::info!(
            target: "stats",
            cached_buffers = buffers.cached_count(),
            allocated_buffers = buffers.allocated_count(),
            active_tasks = tasks.active_count(),
            "periodic stats preamble"
        );
    }

    let mut routes_with_regression = 0u32;

    for route in routes.snapshot() {
        let accumulator = accumulate_route(&route);
        let prev = route.periodic_stats();

        let req_diff = accumulator.count_request as i64 - prev.count_request as i64;

        if req_diff >= 0 {
            let avg = compute_rates(&prev, &accumulator, req_diff as u64, stats_interval);
            route.set_periodic_stats_avg(avg).await;

            #[cfg(feature = "metrics")]
            {
                let labels = [route.id.database.as_str(), route.id.user.as_str()];
                metrics::ROUTE_RPS.with_label_values(&labels).set(avg.rps as f64);
                metrics::ROUTE_QUERY_TIME_US
                    .with_label_values(&labels)
                    .set(avg.query_time_us as f64);
            }
        } else {
            // req_diff < 0: sanity gate (spec.md §4.4 step 4). periodic_stats_avg
            // is left as-is; periodic_stats is still refreshed below either way.
            routes_with_regression += 1;
        }

        route.set_periodic_stats(accumulator);

        if log_stats {
            let avg = route.periodic_stats_avg().await;
            tracing::info!(
                target: "stats",
                database = %route.id.database,
                user = %route.id.user,
                version = route.id.version,
                is_obsolete = route.scheme.is_obsolete(),
                clients = route.client_count(),
                active = route.server_pool.active_count(),
                idle = route.server_pool.idle_count(),
                rps = avg.rps,
                avg_query_time_us = avg.query_time_us,
                recv_client_rate = avg.recv_client_rate,
                recv_server_rate = avg.recv_server_rate,
                "route stats"
            );
        }
    }

    telemetry
        .record_event(
            TelemetrySeverity::Info,
            "stats",
            format!(
                "stats pass over {} route(s), {} with a counter regression",
                routes.len(),
                routes_with_regression
            ),
            None,
        )
        .await;
}

fn accumulate_route(route: &super::route::Route) -> ServerStatsSnapshot {
    let mut accumulator = ServerStatsSnapshot::default();
    for server in route.server_pool.all_servers() {
        match route.server_pool.state_of(&server) {
            Some(super::server::ServerState::Active) | Some(super::server::ServerState::Idle) => {
                accumulator.accumulate(&server.stats.snapshot());
            }
            _ => {}
        }
    }
    accumulator
}

/// Step 5 of spec.md §4.4, preserved verbatim including the double
/// division. See DESIGN.md's "Open Question decisions" entry 1: the
/// `rps`/`recv_client_rate`/`recv_server_rate` formulas divide by
/// `stats_interval` twice (once per snapshot, once on the difference); the
/// `avg_query_time_us` divisor is the raw, undivided `req_diff`. This
/// asymmetry is in the source material, not an inconsistency introduced
/// here.
fn compute_rates(
    prev: &ServerStatsSnapshot,
    curr: &ServerStatsSnapshot,
    req_diff: u64,
    interval: u64,
) -> ServerStatsAvg {
    let i = interval.max(1) as i64;

    let rps = double_divided_rate(prev.count_request, curr.count_request, i);
    let recv_client_rate = double_divided_rate(prev.recv_client, curr.recv_client, i);
    let recv_server_rate = double_divided_rate(prev.recv_server, curr.recv_server, i);

    let query_time_us = if req_diff > 0 {
        (curr.query_time - prev.query_time) / req_diff
    } else {
        0
    };

    ServerStatsAvg {
        rps: rps as u64,
        query_time_us,
        recv_client_rate: recv_client_rate as u64,
        recv_server_rate: recv_server_rate as u64,
    }
}

fn double_divided_rate(prev: u64, curr: u64, interval: i64) -> i64 {
    let prev_per_interval = prev as i64 / interval;
    let curr_per_interval = curr as i64 / interval;
    (curr_per_interval - prev_per_interval) / interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::route_pool::RoutePool;
    use crate::pool::server::Server;

    #[tokio::test]
    async fn s4_stats_basic_example() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 30);
        let server = Server::new(route.id.clone());
        route.server_pool.push_idle(server.clone());
        route.server_pool.activate(&server);

        for _ in 0..10 {
            server.stats.record_request();
        }
        server.stats.record_query_time(5000);

        let buffers = MessageBufferCache::new();
        let tasks = TaskRegistry::new();
        let telemetry = TelemetryHistory::new(64, 1);
        run_stats_pass(&routes, 2, false, &buffers, &tasks, &telemetry).await;

        let avg = route.periodic_stats_avg().await;
        assert_eq!(avg.rps, 2);
        assert_eq!(avg.query_time_us, 500);
    }

    #[tokio::test]
    async fn s5_counter_regression_keeps_prior_average() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 30);
        let a = Server::new(route.id.clone());
        let b = Server::new(route.id.clone());
        route.server_pool.push_idle(a.clone());
        route.server_pool.push_idle(b.clone());
        route.server_pool.activate(&a);
        route.server_pool.activate(&b);
        for _ in 0..100 {
            a.stats.record_request();
        }

        let buffers = MessageBufferCache::new();
        let tasks = TaskRegistry::new();
        let telemetry = TelemetryHistory::new(64, 1);
        run_stats_pass(&routes, 1, false, &buffers, &tasks, &telemetry).await;
        let avg_before = route.periodic_stats_avg().await;
        assert_eq!(route.periodic_stats().count_request, 100);

        // Server `a` (the 100 requests) is closed between samples; only
        // `b`'s untouched counters remain.
        route.server_pool.release(&a);
        route.server_pool.force_expire_idle();
        route.server_pool.drain_expired();
        let all = route.server_pool.all_servers();
        assert_eq!(all.len(), 1);
        for _ in 0..40 {
            b.stats.record_request();
        }

        run_stats_pass(&routes, 1, false, &buffers, &tasks, &telemetry).await;
        let avg_after = route.periodic_stats_avg().await;
        assert_eq!(avg_after, avg_before, "sanity gate must hold averages steady");
        assert_eq!(route.periodic_stats().count_request, 40);
    }

    #[tokio::test]
    async fn excludes_expire_and_detached_servers_from_accumulation() {
        let routes = RoutePool::new();
        let route = routes.get_or_create("app", "app", 1);
        let server = Server::new(route.id.clone());
        server.set_idle_time(5);
        route.server_pool.push_idle(server.clone());
        server.stats.record_request();

        route.server_pool.mark_expired(1);
        assert_eq!(route.server_pool.expire_count(), 1);

        let buffers = MessageBufferCache::new();
        let tasks = TaskRegistry::new();
        let telemetry = TelemetryHistory::new(64, 1);
        run_stats_pass(&routes, 1, false, &buffers, &tasks, &telemetry).await;

        let avg = route.periodic_stats_avg().await;
        assert_eq!(avg.rps, 0);
        assert_eq!(
            route.periodic_stats().count_request,
            0,
            "expired server's counters must not be summed"
        );
    }

    #[tokio::test]
    async fn stats_pass_records_a_telemetry_summary() {
        let routes = RoutePool::new();
        routes.get_or_create("app", "app", 30);

        let buffers = MessageBufferCache::new();
        let tasks = TaskRegistry::new();
        let telemetry = TelemetryHistory::new(64, 1);
        run_stats_pass(&routes, 1, false, &buffers, &tasks, &telemetry).await;

        let events = telemetry.get_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "stats");
    }

    #[tokio::test]
    async fn empty_pool_short_circuits_without_logging_or_telemetry() {
        let routes = RoutePool::new();
        let buffers = MessageBufferCache::new();
        let tasks = TaskRegistry::new();
        let telemetry = TelemetryHistory::new(64, 1);
        run_stats_pass(&routes, 1, true, &buffers, &tasks, &telemetry).await;

        assert!(telemetry.get_events().await.is_empty(), "nothing to summarize with zero routes");
    }
}
