//! Tunable parameters (spec §6: "Configuration (recognized options)").

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a local DHT instance answers inbound protocol requests.
///
/// Grounded in the teacher crate's own `Mode` type (exercised directly by
/// `ant-kad/tests/client_mode.rs`): a client never stores provider/record
/// state on behalf of the network and never appears in `FIND_NODE`
/// replies as a serving peer, it only issues queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Client,
    Server,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Server
    }
}

/// All tunables recognized by this crate, with the defaults spec.md lists.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bucket size / replication factor `k`.
    pub k: usize,
    /// Disjoint query paths `alpha`.
    pub alpha: usize,
    /// Per-path concurrency `beta`; defaults to `alpha` if unset.
    pub beta: usize,
    /// Record TTL: records older than this are discarded on read.
    pub record_ttl: Duration,
    /// Provider entry TTL.
    pub provider_ttl: Duration,
    /// Overall query timeout.
    pub query_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Interval between bucket-refresh sweeps.
    pub bucket_refresh_interval: Duration,
    /// Interval between record republish sweeps.
    pub record_republish_interval: Duration,
    /// Interval between provider republish sweeps.
    pub provider_republish_interval: Duration,
    /// Interval between record/provider GC sweeps.
    pub cleanup_interval: Duration,
    /// Maximum simultaneous in-flight RPCs to a single peer.
    pub max_inflight_per_peer: usize,
    /// Minimum number of records to gather before reselecting on `get`.
    pub get_quorum: usize,
    /// Whether this instance serves inbound queries.
    pub mode: Mode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            k: 20,
            alpha: 3,
            beta: 3,
            record_ttl: Duration::from_secs(36 * 3600),
            provider_ttl: Duration::from_secs(24 * 3600),
            query_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            bucket_refresh_interval: Duration::from_secs(10 * 60),
            record_republish_interval: Duration::from_secs(22 * 3600),
            provider_republish_interval: Duration::from_secs(12 * 3600),
            cleanup_interval: Duration::from_secs(5 * 60),
            max_inflight_per_peer: 4,
            get_quorum: 16,
            mode: Mode::Server,
        }
    }
}

impl Config {
    /// `beta`, defaulting to `alpha` when the caller leaves it at zero.
    pub fn effective_beta(&self) -> usize {
        if self.beta == 0 {
            self.alpha
        } else {
            self.beta
        }
    }
}
