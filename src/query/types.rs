//! Shared query-engine vocabulary (spec §4.G).
//!
//! Names follow `QueryConfig`/`PeerState` in
//! `ant-node/src/networking/kad/query.rs`; the engine itself
//! (`super::engine`) replaces that file's single bounded-alpha queue with
//! the disjoint multi-path runner spec §4.G describes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::KadError;
use crate::peer::Contact;

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryId(u64);

impl QueryId {
    pub fn next() -> Self {
        QueryId(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tunables for one run of the query engine (spec §4.G).
#[derive(Clone, Debug)]
pub struct QueryConfig {
    /// `α`: number of disjoint paths.
    pub alpha: usize,
    /// `β`: per-path concurrency; defaults to `α`.
    pub beta: usize,
    /// `k`: result width.
    pub k: usize,
    /// Overall deadline for the whole query.
    pub timeout: Duration,
}

impl QueryConfig {
    pub fn from_dht_config(config: &crate::config::Config) -> Self {
        QueryConfig {
            alpha: config.alpha,
            beta: config.effective_beta(),
            k: config.k,
            timeout: config.query_timeout,
        }
    }
}

/// One step returned by a caller-supplied `queryPeer` function (spec
/// §4.G's `PathStep`).
pub enum PathStep {
    /// Continue with additional candidates learned from this peer.
    CloserPeers(Vec<Contact>),
    /// The whole query terminates successfully; `peer` is the result.
    QueryComplete { peer: Contact },
    /// This path is done, but siblings continue.
    PathComplete { closer_peers: Vec<Contact> },
    /// The peer failed; the path continues with remaining candidates.
    Failed(KadError),
}

/// The function a caller supplies to drive one path's RPCs: `queryPeer`
/// in spec §4.G.
pub type QueryFn = Arc<dyn Fn(Contact) -> BoxFuture<'static, PathStep> + Send + Sync>;

/// Cooperative cancellation shared by every worker in a query (spec §5:
/// "queries mark their cancel flag, workers return at the next
/// checkpoint").
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a single path (spec §4.G: "`paths[i].success`... `paths[i].peer`").
#[derive(Debug, Default)]
pub struct PathOutcome {
    pub success: bool,
    pub peer: Option<Contact>,
    pub queried: std::collections::HashSet<crate::peer::PeerId>,
    pub closest_queried: Vec<Contact>,
}

/// Overall query result (spec §4.G: "`{paths, finalSet}`").
#[derive(Debug)]
pub struct QueryOutcome {
    pub paths: Vec<PathOutcome>,
    pub final_set: Vec<Contact>,
    pub winner: Option<Contact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_ids_are_unique_and_increasing() {
        let a = QueryId::next();
        let b = QueryId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn cancel_token_starts_uncancelled_and_latches_once_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled(), "cancellation must be visible through every clone");
    }

    #[test]
    fn query_config_from_dht_config_carries_the_effective_beta() {
        let mut config = crate::config::Config::default();
        config.alpha = 3;
        config.beta = 0;
        config.k = 20;
        let query_config = QueryConfig::from_dht_config(&config);
        assert_eq!(query_config.alpha, 3);
        assert_eq!(query_config.beta, config.effective_beta());
        assert_eq!(query_config.k, 20);
        assert_eq!(query_config.timeout, config.query_timeout);
    }
}
