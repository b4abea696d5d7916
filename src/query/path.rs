//! A single disjoint query path (spec §4.G, steps 2-4).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tracing::trace;

use crate::id::{Distance, KadId};
use crate::peer::{Contact, PeerId};
use crate::query::types::{CancelToken, PathOutcome, PathStep, QueryFn};

#[derive(Clone)]
struct Candidate {
    contact: Contact,
    distance: Distance,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.contact.peer_id == other.contact.peer_id
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

/// The set of peers every path agrees not to contend over, enforcing
/// disjointness by first-claim (spec §4.G step 6, invariant 3).
pub type ClaimSet = Arc<Mutex<HashSet<PeerId>>>;

/// Attempt to claim `peer` for this path. Returns `true` if this is the
/// first path to see it (spec §9(c): "specification mandates first-claim
/// wins").
fn try_claim(claims: &ClaimSet, peer: &PeerId) -> bool {
    claims.lock().expect("claim set mutex poisoned").insert(peer.clone())
}

pub struct Path {
    target: KadId,
    beta: usize,
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
    all_seen: HashMap<PeerId, Candidate>,
    queried: HashSet<PeerId>,
    claims: ClaimSet,
}

impl Path {
    pub fn new(target: KadId, beta: usize, k: usize, claims: ClaimSet, seeds: Vec<Contact>) -> Self {
        let mut path = Path {
            target,
            beta,
            k,
            heap: BinaryHeap::new(),
            all_seen: HashMap::new(),
            queried: HashSet::new(),
            claims,
        };
        for seed in seeds {
            path.offer(seed);
        }
        path
    }

    /// Offer a freshly-discovered candidate. No-op if already seen by
    /// this path or already claimed by a sibling path.
    fn offer(&mut self, contact: Contact) {
        let peer = contact.peer_id.clone();
        if self.all_seen.contains_key(&peer) {
            return;
        }
        if !try_claim(&self.claims, &peer) {
            return;
        }
        let distance = contact.peer_id.kad_id().distance(&self.target);
        let candidate = Candidate { contact, distance };
        self.all_seen.insert(peer, candidate.clone());
        self.heap.push(Reverse(candidate));
    }

    fn pop_next(&mut self) -> Option<Contact> {
        while let Some(Reverse(candidate)) = self.heap.pop() {
            if !self.queried.contains(&candidate.contact.peer_id) {
                return Some(candidate.contact);
            }
        }
        None
    }

    /// The "no-closer" stall condition (spec §4.G step 4): the `k`
    /// closest candidates ever seen by this path have all been queried.
    fn is_stalled(&self) -> bool {
        let mut seen: Vec<&Candidate> = self.all_seen.values().collect();
        seen.sort_by(|a, b| a.distance.cmp(&b.distance));
        seen.truncate(self.k);
        !seen.is_empty() && seen.iter().all(|c| self.queried.contains(&c.contact.peer_id))
    }

    fn closest_queried(&self) -> Vec<Contact> {
        let mut queried: Vec<Contact> = self
            .all_seen
            .values()
            .filter(|c| self.queried.contains(&c.contact.peer_id))
            .map(|c| c.contact.clone())
            .collect();
        queried.sort_by(|a, b| a.peer_id.kad_id().distance(&self.target).cmp(&b.peer_id.kad_id().distance(&self.target)));
        queried.truncate(self.k);
        queried
    }

    /// Drive this path to completion: up to `beta` concurrent workers
    /// popping the closest unqueried candidate, issuing `query_peer`, and
    /// merging the result (spec §4.G steps 2-4).
    pub async fn run(mut self, query_peer: QueryFn, cancel: CancelToken) -> PathOutcome {
        let mut inflight = FuturesUnordered::new();
        let mut winner: Option<Contact> = None;
        let mut path_complete = false;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            while inflight.len() < self.beta && !path_complete {
                match self.pop_next() {
                    Some(contact) => {
                        self.queried.insert(contact.peer_id.clone());
                        let f = query_peer.clone();
                        let c = contact.clone();
                        inflight.push(async move { (c, f(contact).await) });
                    }
                    None => break,
                }
            }

            if inflight.is_empty() {
                break;
            }

            let (contact, step) = match inflight.next().await {
                Some(item) => item,
                None => break,
            };

            match step {
                PathStep::CloserPeers(peers) => {
                    for peer in peers {
                        self.offer(peer);
                    }
                }
                PathStep::QueryComplete { peer } => {
                    winner = Some(peer);
                    break;
                }
                PathStep::PathComplete { closer_peers } => {
                    for peer in closer_peers {
                        self.offer(peer);
                    }
                    path_complete = true;
                }
                PathStep::Failed(err) => {
                    trace!(peer = %contact.peer_id, error = %err, "path query step failed");
                }
            }

            if path_complete && inflight.is_empty() {
                break;
            }
            if self.is_stalled() {
                break;
            }
        }

        if winner.is_some() {
            // Claim global success immediately so sibling paths stop at
            // their next checkpoint (spec §4.G step 5).
            cancel.cancel();
        }

        PathOutcome {
            success: winner.is_some() || path_complete,
            peer: winner,
            queried: self.queried.clone(),
            closest_queried: self.closest_queried(),
        }
    }
}
