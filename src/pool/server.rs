use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;

use super::route::RouteId;
use super::stats::ServerStats;

/// Lifecycle state of a [`Server`] within its route's [`super::server_pool::ServerPool`].
///
/// A server is present in exactly one state bucket at a time, or none
/// (`Undef`, transitional only — entered while it is being moved between
/// buckets or detached from its route during sweep).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Undef,
    Idle,
    Active,
    Expire,
}

pub type ServerId = u64;

static NEXT_SERVER_ID: AtomicU64 = AtomicU64::new(1);

/// A single upstream connection to a backing database.
///
/// Created by the (out of scope) acceptor/backend logic and destroyed by the
/// expiry engine's sweep phase. Carries a [`RouteId`] rather than an
/// `Arc<Route>` back-reference so route and server pools never form an
/// ownership cycle; the sweep phase resolves the owning route through the
/// `RoutePool` when it needs to.
#[derive(Debug)]
pub struct Server {
    pub id: ServerId,
    route: Mutex<Option<RouteId>>,
    idle_time: AtomicU32,
    pub stats: ServerStats,
    io: Mutex<Option<TcpStream>>,
}

impl Server {
    /// Construct a server already attached to `route`, with no underlying
    /// transport (a test/fake server). Use [`Server::with_io`] to attach one.
    pub fn new(route: RouteId) -> Arc<Server> {
        Arc::new(Server {
            id: NEXT_SERVER_ID.fetch_add(1, Ordering::Relaxed),
            route: Mutex::new(Some(route)),
            idle_time: AtomicU32::new(0),
            stats: ServerStats::default(),
            io: Mutex::new(None),
        })
    }

    pub fn with_io(route: RouteId, io: TcpStream) -> Arc<Server> {
        let server = Server::new(route);
        *server.io.lock().unwrap() = Some(io);
        server
    }

    pub fn idle_time(&self) -> u32 {
        self.idle_time.load(Ordering::Relaxed)
    }

    pub fn set_idle_time(&self, value: u32) {
        self.idle_time.store(value, Ordering::Relaxed);
    }

    pub fn increment_idle_time(&self) {
        self.idle_time.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route(&self) -> Option<RouteId> {
        self.route.lock().unwrap().clone()
    }

    /// Detach from the owning route. Called once, by the sweep phase, after
    /// the server has already been removed from every state bucket.
    pub fn clear_route(&self) {
        *self.route.lock().unwrap() = None;
    }

    /// Take the underlying transport, leaving the server with none. Used by
    /// `Backend` implementations that need to consume the stream to close it.
    pub fn take_io(&self) -> Option<TcpStream> {
        self.io.lock().unwrap().take()
    }

    pub fn has_io(&self) -> bool {
        self.io.lock().unwrap().is_some()
    }
}
