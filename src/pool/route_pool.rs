use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::route::{Route, RouteId, RouteScheme};

/// Registry of every [`Route`] known to the process, keyed by [`RouteId`].
///
/// Grounded on the teacher's `SessionManager`: a `DashMap` gives per-shard
/// locking so lookups and inserts from many client-facing tasks don't
/// contend with each other or with the periodic driver's full-table scan.
#[derive(Debug, Default)]
pub struct RoutePool {
    routes: DashMap<RouteId, Arc<Route>>,
    next_version: AtomicU64,
}

impl RoutePool {
    pub fn new() -> RoutePool {
        RoutePool {
            routes: DashMap::new(),
            next_version: AtomicU64::new(1),
        }
    }

    /// Fetch an existing, non-obsolete route or create one with a freshly
    /// minted version. Mirrors Odyssey's `od_router_route` in shape, not in
    /// its locking: two callers racing to create the same `(database,
    /// user)` pair for the first time can both miss `find_current` and each
    /// insert a route, same as the resolver this crate doesn't implement
    /// would need to arbitrate. Maintenance-engine callers only ever read
    /// or seed routes at startup, so this race is out of this crate's path.
    pub fn get_or_create(&self, database: &str, user: &str, pool_ttl: u32) -> Arc<Route> {
        if let Some(existing) = self.find_current(database, user) {
            return existing;
        }
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let id = RouteId {
            database: database.to_string(),
            user: user.to_string(),
            version,
        };
        let scheme = RouteScheme::new(pool_ttl, false, version);
        let route = Route::new(id.clone(), scheme);
        self.routes.insert(id, route.clone());
        route
    }

    /// Find the current (non-obsolete) route for a `(database, user)` pair,
    /// if any. Linear in the number of versions kept for that pair, which in
    /// practice is one or two (spec.md §4.2's obsolete-version overlap
    /// window).
    pub fn find_current(&self, database: &str, user: &str) -> Option<Arc<Route>> {
        self.routes
            .iter()
            .filter(|entry| entry.key().database == database && entry.key().user == user)
            .filter(|entry| !entry.value().scheme.is_obsolete())
            .map(|entry| entry.value().clone())
            .next()
    }

    pub fn get(&self, id: &RouteId) -> Option<Arc<Route>> {
        self.routes.get(id).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, route: Arc<Route>) {
        self.routes.insert(route.id.clone(), route);
    }

    /// Mark the current route for `(database, user)` obsolete and return it,
    /// without removing it from the table — callers still draining its
    /// server pool need to find it by id until the drain completes.
    pub fn mark_obsolete(&self, database: &str, user: &str) -> Option<Arc<Route>> {
        let route = self.find_current(database, user)?;
        route.scheme.set_obsolete(true);
        Some(route)
    }

    /// Remove a route outright once its server pool has fully drained.
    pub fn remove(&self, id: &RouteId) -> Option<Arc<Route>> {
        self.routes.remove(id).map(|(_, route)| route)
    }

    /// Snapshot of every route currently registered. Cloned `Arc`s so the
    /// caller can iterate and await without holding any `DashMap` shard
    /// lock across a suspension point.
    pub fn snapshot(&self) -> Vec<Arc<Route>> {
        self.routes.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes marked obsolete whose server pool has fully drained are safe
    /// to remove outright; this is the garbage-collection half of route
    /// maintenance (spec.md §4.2).
    pub fn reap_obsolete_drained(&self) -> Vec<RouteId> {
        let reaped: Vec<RouteId> = self
            .routes
            .iter()
            .filter(|entry| {
                entry.value().scheme.is_obsolete()
                    && entry.value().client_count() == 0
                    && entry.value().server_pool.total_count() == 0
            })
            .map(|entry| entry.key().clone())
            .collect();
        for id in &reaped {
            self.routes.remove(id);
        }
        reaped
    }
}
