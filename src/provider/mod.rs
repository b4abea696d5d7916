//! Component D: the provider store (spec §4.D).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::id::KadId;
use crate::peer::PeerId;

/// Local mapping from content ID to the set of peers advertising that
/// they can serve it, each with an expiry (spec §3: "Provider entry").
pub struct ProviderStore {
    // keyed by the raw content id bytes, not its KadId, so `cid` round-trips
    // unmodified through addProvider/getProviders.
    entries: RwLock<HashMap<Vec<u8>, HashMap<PeerId, Instant>>>,
    default_ttl: Duration,
}

impl ProviderStore {
    pub fn new(default_ttl: Duration) -> Self {
        ProviderStore {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Record that `peer` provides `cid`. Idempotent: re-adding the same
    /// (cid, peer) pair refreshes the expiry rather than duplicating the
    /// entry (spec §4.D, round-trip property "latest expiry winning").
    pub async fn add_provider(&self, cid: Vec<u8>, peer: PeerId) {
        let mut guard = self.entries.write().await;
        let peers = guard.entry(cid.clone()).or_insert_with(HashMap::new);
        peers.insert(peer, Instant::now());
        trace!(cid = ?cid, "recorded provider");
    }

    /// Non-expired providers for `cid` (spec invariant 8).
    pub async fn get_providers(&self, cid: &[u8]) -> Vec<PeerId> {
        let guard = self.entries.read().await;
        match guard.get(cid) {
            Some(peers) => peers
                .iter()
                .filter(|(_, added)| added.elapsed() <= self.default_ttl)
                .map(|(peer, _)| peer.clone())
                .collect(),
            None => vec![],
        }
    }

    /// All CIDs this instance has locally recorded providers for —
    /// equivalently, the CIDs we ourselves are providing if we're among
    /// the recorded peers, used by the provider-republish maintenance
    /// loop.
    pub async fn provided_cids(&self, by: &PeerId) -> Vec<Vec<u8>> {
        let guard = self.entries.read().await;
        guard
            .iter()
            .filter(|(_, peers)| peers.contains_key(by))
            .map(|(cid, _)| cid.clone())
            .collect()
    }

    /// Drop expired entries; idempotent (spec §4.D).
    pub async fn gc(&self) {
        let mut guard = self.entries.write().await;
        let ttl = self.default_ttl;
        let mut dropped = 0usize;
        guard.retain(|_, peers| {
            peers.retain(|_, added| added.elapsed() <= ttl);
            if peers.is_empty() {
                dropped += 1;
                false
            } else {
                true
            }
        });
        if dropped > 0 {
            debug!(dropped, "garbage-collected empty provider entries");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(|p| p.len()).sum()
    }
}

/// Map a content identifier into ID space, same SHA-256 contract as
/// peer ids and record keys (spec §4.A).
pub fn cid_to_kad_id(cid: &[u8]) -> KadId {
    KadId::of(cid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_provider_is_idempotent() {
        let store = ProviderStore::new(Duration::from_secs(3600));
        let peer = PeerId::new(vec![1]);
        store.add_provider(b"cid".to_vec(), peer.clone()).await;
        store.add_provider(b"cid".to_vec(), peer.clone()).await;
        assert_eq!(store.get_providers(b"cid").await.len(), 1);
    }

    #[tokio::test]
    async fn expired_providers_are_not_returned() {
        let store = ProviderStore::new(Duration::from_millis(1));
        store.add_provider(b"cid".to_vec(), PeerId::new(vec![1])).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get_providers(b"cid").await.is_empty());
    }

    #[tokio::test]
    async fn gc_drops_empty_entries() {
        let store = ProviderStore::new(Duration::from_millis(1));
        store.add_provider(b"cid".to_vec(), PeerId::new(vec![1])).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.gc().await;
        assert_eq!(store.len().await, 0);
    }
}
