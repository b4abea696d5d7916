//! Component H: peer routing operations (spec §4.H).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::dht::KadDht;
use crate::error::KadError;
use crate::id::{cmp_by_distance, KadId};
use crate::network::{Network, Transport};
use crate::peer::{Contact, PeerId};
use crate::protocol::KadRequest;
use crate::query::{self, CancelToken, PathStep, QueryConfig, QueryFn};
use crate::record::RecordStore;

/// Build the shared `queryPeer` closure that sends `FIND_NODE(target)`
/// and reports `{closerPeers}` for every reply (spec §4.G step 3).
///
/// The wire `target` is always the 32-byte `KadId` digest, never a raw
/// preimage: a responder only ever needs to compute distances against
/// it, never to invert it.
pub(crate) fn find_node_query_fn<T: Transport + 'static>(network: Arc<Network<T>>, target_id: KadId) -> QueryFn {
    Arc::new(move |contact: Contact| {
        let network = network.clone();
        let target_bytes = target_id.as_bytes().to_vec();
        Box::pin(async move {
            let request = KadRequest::FindNode { target: target_bytes };
            match network.send_request(&contact.peer_id, request).await {
                Ok(response) => {
                    let closer: Vec<Contact> = response
                        .closer_peers
                        .into_iter()
                        .map(|wire| Contact::new(wire.id, wire.addrs))
                        .collect();
                    PathStep::CloserPeers(closer)
                }
                Err(err) => PathStep::Failed(err),
            }
        })
    })
}

/// Like [`find_node_query_fn`] but stops the whole query as soon as a
/// peer reply contains `target` itself exactly (spec §4.H step 3:
/// "`findPeer`: ... if reply contains the exact target ID, return
/// `{peer, queryComplete: true}`").
fn find_peer_query_fn<T: Transport + 'static>(network: Arc<Network<T>>, target: PeerId) -> QueryFn {
    Arc::new(move |contact: Contact| {
        let network = network.clone();
        let target = target.clone();
        let target_bytes = target.kad_id().as_bytes().to_vec();
        Box::pin(async move {
            let request = KadRequest::FindNode { target: target_bytes };
            match network.send_request(&contact.peer_id, request).await {
                Ok(response) => {
                    if let Some(found) = response.closer_peers.iter().find(|p| p.id == target) {
                        return PathStep::QueryComplete {
                            peer: Contact::new(found.id.clone(), found.addrs.clone()),
                        };
                    }
                    let closer: Vec<Contact> = response
                        .closer_peers
                        .into_iter()
                        .map(|wire| Contact::new(wire.id, wire.addrs))
                        .collect();
                    PathStep::CloserPeers(closer)
                }
                Err(err) => PathStep::Failed(err),
            }
        })
    })
}

impl<T: Transport + 'static, R: RecordStore + 'static> KadDht<T, R> {
    /// `findPeer(target, timeout)` (spec §4.H).
    pub async fn find_peer(&self, target: &PeerId, timeout: Duration) -> Result<Contact, KadError> {
        if let Some(contact) = self.routing_table.lock().await.find(target) {
            debug!(peer = %target, "find_peer resolved locally");
            return Ok(contact);
        }
        if let Some(info) = self.address_book.get(target).await {
            return Ok(Contact::new(info.peer_id, info.addresses));
        }

        let target_id = target.kad_id();
        let seeds = self.routing_table.lock().await.closest_peers(&target_id, self.config.k);
        if seeds.is_empty() {
            return Err(KadError::LookupFailed);
        }

        let mut config = QueryConfig::from_dht_config(&self.config);
        config.timeout = timeout;
        let query_fn = find_peer_query_fn(self.network.clone(), target.clone());
        let outcome = query::run(target_id, seeds, config, query_fn, CancelToken::new()).await;

        for contact in outcome.final_set.iter().cloned() {
            self.network.observe_contact(contact).await;
        }

        match outcome.winner {
            Some(contact) => {
                self.network.observe_contact(contact.clone()).await;
                Ok(contact)
            }
            None => Err(KadError::NotFound),
        }
    }

    /// `getClosestPeers(key)` (spec §4.H): run a plain `FIND_NODE` query
    /// with no winning condition, then sort and truncate the discovered
    /// set by distance to `SHA256(key)`.
    pub async fn get_closest_peers(&self, key: &[u8]) -> Vec<PeerId> {
        self.get_closest_peers_by_id(KadId::of(key))
            .await
            .into_iter()
            .map(|c| c.peer_id)
            .collect()
    }

    /// As [`Self::get_closest_peers`], but for a target already in ID
    /// space (no preimage available) and returning full [`Contact`]s.
    /// Used directly by the bucket-refresh maintenance loop, which only
    /// ever has a random `KadId`, never a real key or peer id.
    pub(crate) async fn get_closest_peers_by_id(&self, target_id: KadId) -> Vec<Contact> {
        let seeds = self.routing_table.lock().await.closest_peers(&target_id, self.config.k);
        if seeds.is_empty() {
            return vec![];
        }

        let config = QueryConfig::from_dht_config(&self.config);
        let query_fn = find_node_query_fn(self.network.clone(), target_id);
        let outcome = query::run(target_id, seeds, config, query_fn, CancelToken::new()).await;

        for contact in outcome.final_set.iter().cloned() {
            self.network.observe_contact(contact).await;
        }

        let mut final_set = outcome.final_set;
        final_set.sort_by(|a, b| cmp_by_distance(&target_id, &a.peer_id.kad_id(), &b.peer_id.kad_id()));
        final_set.truncate(self.config.k);
        final_set
    }
}
