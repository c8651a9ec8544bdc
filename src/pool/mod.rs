//! The pool maintenance engine: idle expiry, obsolete-route GC, and rolling
//! per-route statistics.

pub mod backend;
pub mod buffer_cache;
pub mod driver;
pub mod expiry;
pub mod route;
pub mod route_pool;
pub mod server;
pub mod server_pool;
pub mod stats;
pub mod stats_engine;
pub mod task_registry;

pub use backend::{Backend, NullBackend, TcpBackend};
pub use buffer_cache::MessageBufferCache;
pub use driver::PeriodicDriver;
pub use route::{Route, RouteId, RouteScheme};
pub use route_pool::RoutePool;
pub use server::{Server, ServerId, ServerState};
pub use server_pool::ServerPool;
pub use stats::{ServerStats, ServerStatsAvg, ServerStatsSnapshot};
pub use task_registry::TaskRegistry;
