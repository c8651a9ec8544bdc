use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::server::{Server, ServerState};

/// The three state buckets a [`Server`] can live in, guarded together by a
/// single lock.
///
/// Keeping all three buckets behind one `Mutex` (rather than one lock per
/// bucket) is what gives the mark phase its "single non-suspending critical
/// section" property: a server can never be observed half-moved between
/// buckets by another thread, because moving it is always one lock
/// acquisition.
#[derive(Debug, Default)]
struct ServerBuckets {
    idle: Vec<Arc<Server>>,
    active: Vec<Arc<Server>>,
    expire: Vec<Arc<Server>>,
}

/// Per-route storage for every [`Server`] currently attached to that route.
///
/// All mutation goes through methods that take the internal lock for the
/// duration of a single, synchronous, non-awaiting operation. Callers must
/// never hold a reference into the lock across an `.await` point; every
/// method here returns owned data precisely so they don't have to.
#[derive(Debug, Default)]
pub struct ServerPool {
    buckets: Mutex<ServerBuckets>,
    idle_count: AtomicUsize,
    active_count: AtomicUsize,
    expire_count: AtomicUsize,
}

impl ServerPool {
    pub fn new() -> ServerPool {
        ServerPool::default()
    }

    pub fn idle_count(&self) -> usize {
        self.idle_count.load(Ordering::Relaxed)
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    pub fn expire_count(&self) -> usize {
        self.expire_count.load(Ordering::Relaxed)
    }

    pub fn total_count(&self) -> usize {
        self.idle_count() + self.active_count() + self.expire_count()
    }

    /// Insert a freshly created server into the idle bucket.
    pub fn push_idle(&self, server: Arc<Server>) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.idle.push(server);
        self.idle_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Move a server from idle to active (checked out by a client).
    pub fn activate(&self, server: &Arc<Server>) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(pos) = buckets.idle.iter().position(|s| Arc::ptr_eq(s, server)) {
            let server = buckets.idle.remove(pos);
            self.idle_count.fetch_sub(1, Ordering::Relaxed);
            server.set_idle_time(0);
            buckets.active.push(server);
            self.active_count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Move a server from active back to idle (returned by a client).
    pub fn release(&self, server: &Arc<Server>) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(pos) = buckets.active.iter().position(|s| Arc::ptr_eq(s, server)) {
            let server = buckets.active.remove(pos);
            self.active_count.fetch_sub(1, Ordering::Relaxed);
            server.set_idle_time(0);
            buckets.idle.push(server);
            self.idle_count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Run the mark phase: walk the idle bucket once, incrementing each
    /// server's idle time and moving the ones that cross `pool_ttl` into the
    /// expire bucket. Returns nothing; callers read back via
    /// [`ServerPool::drain_expired`].
    ///
    /// `pool_ttl == 0` disables expiry for the route entirely (spec.md
    /// §4.3 step 2): servers are left untouched, `idle_time` included.
    pub fn mark_expired(&self, pool_ttl: u32) {
        if pool_ttl == 0 {
            return;
        }

        let mut buckets = self.buckets.lock().unwrap();
        let mut still_idle = Vec::with_capacity(buckets.idle.len());
        for server in buckets.idle.drain(..) {
            if server.idle_time() < pool_ttl {
                server.increment_idle_time();
                still_idle.push(server);
            } else {
                buckets.expire.push(server);
            }
        }
        let moved = buckets.expire.len();
        buckets.idle = still_idle;
        self.idle_count.store(buckets.idle.len(), Ordering::Relaxed);
        self.expire_count.store(moved, Ordering::Relaxed);
    }

    /// Unconditionally move every currently-idle server into the expire
    /// bucket, without incrementing idle time or consulting TTL. Used for
    /// rule 1 of the mark phase (spec.md §4.3): an obsolete, client-free
    /// route drains its idle servers regardless of `pool_ttl`.
    pub fn force_expire_idle(&self) {
        let mut buckets = self.buckets.lock().unwrap();
        let drained: Vec<_> = buckets.idle.drain(..).collect();
        let moved = drained.len();
        buckets.expire.extend(drained);
        self.idle_count.store(0, Ordering::Relaxed);
        self.expire_count.fetch_add(moved, Ordering::Relaxed);
    }

    /// Sweep phase: atomically take every server currently in the expire
    /// bucket, leaving it empty. The caller is responsible for tearing each
    /// one down (closing IO, detaching from its route) outside the lock.
    pub fn drain_expired(&self) -> Vec<Arc<Server>> {
        let mut buckets = self.buckets.lock().unwrap();
        self.expire_count.store(0, Ordering::Relaxed);
        std::mem::take(&mut buckets.expire)
    }

    /// Force every server, regardless of bucket, into the expire bucket and
    /// return them. Used when a route is torn down wholesale (spec.md
    /// §4.2's obsolete-route reap), not by the normal per-tick mark/sweep.
    pub fn drain_all(&self) -> Vec<Arc<Server>> {
        let mut buckets = self.buckets.lock().unwrap();
        let mut all = Vec::with_capacity(
            buckets.idle.len() + buckets.active.len() + buckets.expire.len(),
        );
        all.extend(buckets.idle.drain(..));
        all.extend(buckets.active.drain(..));
        all.extend(buckets.expire.drain(..));
        self.idle_count.store(0, Ordering::Relaxed);
        self.active_count.store(0, Ordering::Relaxed);
        self.expire_count.store(0, Ordering::Relaxed);
        all
    }

    /// Snapshot of server state, used by the statistics engine to sum
    /// counters across every server currently attached to the route
    /// (idle, active, and pending-expire all still count).
    pub fn all_servers(&self) -> Vec<Arc<Server>> {
        let buckets = self.buckets.lock().unwrap();
        buckets
            .idle
            .iter()
            .chain(buckets.active.iter())
            .chain(buckets.expire.iter())
            .cloned()
            .collect()
    }

    pub fn state_of(&self, server: &Arc<Server>) -> Option<ServerState> {
        let buckets = self.buckets.lock().unwrap();
        if buckets.idle.iter().any(|s| Arc::ptr_eq(s, server)) {
            Some(ServerState::Idle)
        } else if buckets.active.iter().any(|s| Arc::ptr_eq(s, server)) {
            Some(ServerState::Active)
        } else if buckets.expire.iter().any(|s| Arc::ptr_eq(s, server)) {
            Some(ServerState::Expire)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::route::RouteId;

    fn route_id() -> RouteId {
        RouteId {
            database: "app".into(),
            user: "app".into(),
            version: 1,
        }
    }

    #[test]
    fn activate_and_release_round_trip() {
        let pool = ServerPool::new();
        let server = Server::new(route_id());
        pool.push_idle(server.clone());
        assert_eq!(pool.idle_count(), 1);

        assert!(pool.activate(&server));
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 1);

        assert!(pool.release(&server));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn mark_expired_moves_servers_past_ttl() {
        let pool = ServerPool::new();
        let a = Server::new(route_id());
        let b = Server::new(route_id());
        a.set_idle_time(5);
        pool.push_idle(a.clone());
        pool.push_idle(b.clone());

        pool.mark_expired(5);
        assert_eq!(pool.expire_count(), 1, "a is already at ttl, b did not yet");
        assert_eq!(pool.idle_count(), 1);

        let expired = pool.drain_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, a.id);
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let pool = ServerPool::new();
        let server = Server::new(route_id());
        server.set_idle_time(1_000_000);
        pool.push_idle(server);

        pool.mark_expired(0);
        assert_eq!(pool.expire_count(), 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn drain_all_empties_every_bucket() {
        let pool = ServerPool::new();
        let idle = Server::new(route_id());
        let active = Server::new(route_id());
        pool.push_idle(idle);
        pool.push_idle(active.clone());
        pool.activate(&active);

        let all = pool.drain_all();
        assert_eq!(all.len(), 2);
        assert_eq!(pool.total_count(), 0);
    }
}
