use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

use super::server_pool::ServerPool;
use super::stats::{ServerStatsAvg, ServerStatsSnapshot};

/// Identifies a logical pool of upstream connections.
///
/// `version` is part of the identity: when a route's configuration is
/// replaced, the resolver (out of scope for this crate) mints a new
/// `RouteId` with a bumped version and marks the old one obsolete, letting
/// both coexist in the [`super::route_pool::RoutePool`] until the old one
/// drains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId {
    pub database: String,
    pub user: String,
    pub version: u64,
}

/// Mutable configuration attached to a route. Kept separate from `RouteId`
/// because `pool_ttl`/`is_obsolete` can be updated by a config reload without
/// minting a new route identity.
#[derive(Debug)]
pub struct RouteScheme {
    is_obsolete: AtomicBool,
    pool_ttl: AtomicU32,
    pub version: u64,
}

impl RouteScheme {
    pub fn new(pool_ttl: u32, is_obsolete: bool, version: u64) -> Arc<RouteScheme> {
        Arc::new(RouteScheme {
            is_obsolete: AtomicBool::new(is_obsolete),
            pool_ttl: AtomicU32::new(pool_ttl),
            version,
        })
    }

    pub fn is_obsolete(&self) -> bool {
        self.is_obsolete.load(Ordering::Relaxed)
    }

    pub fn set_obsolete(&self, value: bool) {
        self.is_obsolete.store(value, Ordering::Relaxed);
    }

    pub fn pool_ttl(&self) -> u32 {
        self.pool_ttl.load(Ordering::Relaxed)
    }

    pub fn set_pool_ttl(&self, value: u32) {
        self.pool_ttl.store(value, Ordering::Relaxed);
    }
}

/// A logical `(database, user, version)` pool of upstream connections.
///
/// The client pool itself is out of scope for this crate; only the count of
/// attached clients is tracked, since that's all the maintenance engine
/// reads (spec.md §3).
#[derive(Debug)]
pub struct Route {
    pub id: RouteId,
    pub scheme: Arc<RouteScheme>,
    client_count: AtomicUsize,
    pub server_pool: ServerPool,
    periodic_stats: Mutex<ServerStatsSnapshot>,
    periodic_stats_avg: RwLock<ServerStatsAvg>,
}

impl Route {
    pub fn new(id: RouteId, scheme: Arc<RouteScheme>) -> Arc<Route> {
        Arc::new(Route {
            id,
            scheme,
            client_count: AtomicUsize::new(0),
            server_pool: ServerPool::new(),
            periodic_stats: Mutex::new(ServerStatsSnapshot::default()),
            periodic_stats_avg: RwLock::new(ServerStatsAvg::default()),
        })
    }

    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    pub fn add_client(&self) {
        self.client_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove_client(&self) {
        let prev = self.client_count.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "client_count underflow");
    }

    pub fn periodic_stats(&self) -> ServerStatsSnapshot {
        *self.periodic_stats.lock().unwrap()
    }

    pub fn set_periodic_stats(&self, snapshot: ServerStatsSnapshot) {
        *self.periodic_stats.lock().unwrap() = snapshot;
    }

    pub async fn periodic_stats_avg(&self) -> ServerStatsAvg {
        *self.periodic_stats_avg.read().await
    }

    pub async fn set_periodic_stats_avg(&self, avg: ServerStatsAvg) {
        *self.periodic_stats_avg.write().await = avg;
    }
}
