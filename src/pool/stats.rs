use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, concurrency-safe counters maintained on each [`super::server::Server`].
///
/// The forwarding fast path (not part of this crate) increments these via
/// `fetch_add`; the statistics engine only ever loads them. No other writer
/// exists, so relaxed ordering is sufficient for both ends.
#[derive(Debug, Default)]
pub struct ServerStats {
    query_time: AtomicU64,
    count_request: AtomicU64,
    recv_client: AtomicU64,
    recv_server: AtomicU64,
}

impl ServerStats {
    pub fn record_query_time(&self, micros: u64) {
        self.query_time.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.count_request.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recv_client(&self, bytes: u64) {
        self.recv_client.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_recv_server(&self, bytes: u64) {
        self.recv_server.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Snapshot the four counters into a plain, arithmetic-friendly struct.
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            query_time: self.query_time.load(Ordering::Relaxed),
            count_request: self.count_request.load(Ordering::Relaxed),
            recv_client: self.recv_client.load(Ordering::Relaxed),
            recv_server: self.recv_server.load(Ordering::Relaxed),
        }
    }
}

/// An absolute, point-in-time sum of [`ServerStats`] across some set of servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub query_time: u64,
    pub count_request: u64,
    pub recv_client: u64,
    pub recv_server: u64,
}

impl ServerStatsSnapshot {
    pub fn accumulate(&mut self, other: &ServerStatsSnapshot) {
        self.query_time = self.query_time.saturating_add(other.query_time);
        self.count_request = self.count_request.saturating_add(other.count_request);
        self.recv_client = self.recv_client.saturating_add(other.recv_client);
        self.recv_server = self.recv_server.saturating_add(other.recv_server);
    }
}

/// Interval-averaged rates derived by the statistics engine between two
/// consecutive [`ServerStatsSnapshot`]s of the same route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatsAvg {
    pub rps: u64,
    pub query_time_us: u64,
    pub recv_client_rate: u64,
    pub recv_server_rate: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_writers() {
        let stats = ServerStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_query_time(150);
        stats.record_recv_client(64);
        stats.record_recv_server(128);

        let snap = stats.snapshot();
        assert_eq!(snap.count_request, 2);
        assert_eq!(snap.query_time, 150);
        assert_eq!(snap.recv_client, 64);
        assert_eq!(snap.recv_server, 128);
    }

    #[test]
    fn snapshot_accumulate_sums_fields() {
        let mut acc = ServerStatsSnapshot::default();
        acc.accumulate(&ServerStatsSnapshot {
            query_time: 10,
            count_request: 1,
            recv_client: 2,
            recv_server: 3,
        });
        acc.accumulate(&ServerStatsSnapshot {
            query_time: 20,
            count_request: 4,
            recv_client: 5,
            recv_server: 6,
        });
        assert_eq!(
            acc,
            ServerStatsSnapshot {
                query_time: 30,
                count_request: 5,
                recv_client: 7,
                recv_server: 9,
            }
        );
    }
}
