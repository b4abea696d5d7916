//! Direct tests of the disjoint multi-path query engine (spec §4.G, the
//! "heart" of this crate) against synthetic peers, with no DHT or
//! transport involved — just `query::run` and hand-written `queryPeer`
//! closures, exercising spec §8 invariants 2, 3 and 4 directly.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kad_dht::id::KadId;
use kad_dht::peer::{Contact, PeerId};
use kad_dht::query::{run, CancelToken, PathStep, QueryConfig, QueryFn};

fn synthetic_peers(n: usize) -> Vec<Contact> {
    (0..n).map(|i| Contact::new(PeerId::new(vec![i as u8, 0xAA, 0x55]), vec![])).collect()
}

/// A `queryPeer` that always replies with every other synthetic peer as a
/// closer candidate, simulating a fully-connected swarm with no winning
/// condition — good for exercising the pure discovery/termination machinery.
fn fully_connected_query_fn(all_peers: Vec<Contact>) -> QueryFn {
    Arc::new(move |contact: Contact| {
        let all_peers = all_peers.clone();
        Box::pin(async move {
            let closer: Vec<Contact> = all_peers.into_iter().filter(|c| c.peer_id != contact.peer_id).collect();
            PathStep::CloserPeers(closer)
        })
    })
}

/// Invariants 2 & 3: the final set is strictly sorted by distance to the
/// target, and no two paths share a queried peer.
#[tokio::test]
async fn disjoint_paths_never_share_a_queried_peer_and_final_set_is_sorted() {
    let target = KadId::of(b"target");
    let all_peers = synthetic_peers(40);
    let seeds: Vec<Contact> = all_peers.iter().take(9).cloned().collect();

    let config = QueryConfig { alpha: 3, beta: 2, k: 20, timeout: Duration::from_secs(5) };
    let query_fn = fully_connected_query_fn(all_peers);
    let outcome = run(target, seeds, config, query_fn, CancelToken::new()).await;

    assert_eq!(outcome.paths.len(), 3, "alpha=3 should produce exactly 3 paths");

    for i in 0..outcome.paths.len() {
        for j in (i + 1)..outcome.paths.len() {
            let shared: HashSet<_> = outcome.paths[i].queried.intersection(&outcome.paths[j].queried).collect();
            assert!(shared.is_empty(), "paths {i} and {j} both queried {shared:?}");
        }
    }

    let distances: Vec<_> = outcome.final_set.iter().map(|c| c.peer_id.kad_id().distance(&target)).collect();
    assert!(
        distances.windows(2).all(|w| w[0] <= w[1]),
        "final_set is not sorted by distance to the target"
    );
}

/// Invariant 4 (best-first): with a single path and a single worker, every
/// successive peer queried must be at least as far from the target as the
/// one before it, given everything discovered so far.
#[tokio::test]
async fn single_path_queries_strictly_closest_first() {
    let target = KadId::of(b"best-first-target");
    let all_peers = synthetic_peers(30);
    let seeds: Vec<Contact> = all_peers.iter().take(3).cloned().collect();

    let order: Arc<Mutex<Vec<_>>> = Arc::new(Mutex::new(Vec::new()));
    let query_fn: QueryFn = {
        let order = order.clone();
        let all_peers = all_peers.clone();
        Arc::new(move |contact: Contact| {
            let order = order.clone();
            let all_peers = all_peers.clone();
            Box::pin(async move {
                order.lock().expect("order log mutex poisoned").push(contact.peer_id.kad_id().distance(&target));
                let closer: Vec<Contact> = all_peers.into_iter().filter(|c| c.peer_id != contact.peer_id).collect();
                PathStep::CloserPeers(closer)
            })
        })
    };

    let config = QueryConfig { alpha: 1, beta: 1, k: 20, timeout: Duration::from_secs(5) };
    let outcome = run(target, seeds, config, query_fn, CancelToken::new()).await;

    assert_eq!(outcome.paths.len(), 1);
    let recorded = order.lock().expect("order log mutex poisoned");
    assert!(
        recorded.windows(2).all(|w| w[0] <= w[1]),
        "peers were not queried closest-first: {recorded:?}"
    );
}

/// A path that reports `queryComplete` terminates the whole query; the
/// winner is the peer that path returned.
#[tokio::test]
async fn query_complete_from_any_path_produces_the_winner() {
    let target = KadId::of(b"winner-target");
    let all_peers = synthetic_peers(20);
    let winner_contact = all_peers[7].clone();
    let seeds: Vec<Contact> = all_peers.iter().take(6).cloned().collect();

    let winner_id = winner_contact.peer_id.clone();
    let query_fn: QueryFn = {
        let all_peers = all_peers.clone();
        let winner_contact = winner_contact.clone();
        Arc::new(move |contact: Contact| {
            let all_peers = all_peers.clone();
            let winner_contact = winner_contact.clone();
            Box::pin(async move {
                if contact.peer_id == winner_contact.peer_id {
                    return PathStep::QueryComplete { peer: winner_contact };
                }
                let closer: Vec<Contact> = all_peers.into_iter().filter(|c| c.peer_id != contact.peer_id).collect();
                PathStep::CloserPeers(closer)
            })
        })
    };

    let config = QueryConfig { alpha: 3, beta: 2, k: 20, timeout: Duration::from_secs(5) };
    let outcome = run(target, seeds, config, query_fn, CancelToken::new()).await;

    let winner = outcome.winner.expect("query should have produced a winner");
    assert_eq!(winner.peer_id, winner_id);
}

/// `pathComplete` ends only that path; siblings still contribute to the
/// final set, and a path that never finds the winner is still marked
/// successful once it completes cleanly.
#[tokio::test]
async fn path_complete_marks_that_path_successful_without_a_winner() {
    let target = KadId::of(b"path-complete-target");
    let all_peers = synthetic_peers(12);
    let seeds: Vec<Contact> = all_peers.clone();

    let query_fn: QueryFn =
        Arc::new(move |_contact: Contact| Box::pin(async move { PathStep::PathComplete { closer_peers: vec![] } }));

    let config = QueryConfig { alpha: 3, beta: 1, k: 20, timeout: Duration::from_secs(5) };
    let outcome = run(target, seeds, config, query_fn, CancelToken::new()).await;

    assert!(outcome.winner.is_none());
    assert!(outcome.paths.iter().all(|p| p.success), "every path should have completed successfully");
}

/// Transport-style failures on individual peers don't abort the path: it
/// keeps working through remaining candidates.
#[tokio::test]
async fn failed_peers_do_not_abort_the_path() {
    let target = KadId::of(b"failure-target");
    let all_peers = synthetic_peers(10);
    let seeds: Vec<Contact> = all_peers.clone();
    let failing = all_peers[0].peer_id.clone();

    let query_fn: QueryFn = {
        let failing = failing.clone();
        Arc::new(move |contact: Contact| {
            let failing = failing.clone();
            Box::pin(async move {
                if contact.peer_id == failing {
                    PathStep::Failed(kad_dht::KadError::Transport("simulated".into()))
                } else {
                    PathStep::CloserPeers(vec![])
                }
            })
        })
    };

    let config = QueryConfig { alpha: 1, beta: 1, k: 20, timeout: Duration::from_secs(5) };
    let outcome = run(target, seeds, config, query_fn, CancelToken::new()).await;

    // The path should still have attempted every seed, including the one
    // that failed, and report them all as queried.
    assert_eq!(outcome.paths[0].queried.len(), 10);
}
