//! Component I: content routing operations (spec §4.I).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::dht::KadDht;
use crate::error::KadError;
use crate::id::KadId;
use crate::network::{Network, Transport};
use crate::peer::{Contact, PeerId};
use crate::protocol::KadRequest;
use crate::query::{self, CancelToken, PathStep, QueryConfig, QueryFn};
use crate::record::RecordStore;

/// `queryPeer` for a provider lookup: sends `GET_PROVIDERS(cid)`,
/// accumulates discovered providers into `found` (deduplicated), and
/// cancels the whole query once `count` distinct providers have been
/// seen (spec §4.I: "terminate on reaching `count`").
fn get_providers_query_fn<T: Transport + 'static>(
    network: Arc<Network<T>>,
    cid: Vec<u8>,
    count: usize,
    found: Arc<AsyncMutex<Vec<PeerId>>>,
    cancel: CancelToken,
) -> QueryFn {
    Arc::new(move |contact: Contact| {
        let network = network.clone();
        let cid = cid.clone();
        let found = found.clone();
        let cancel = cancel.clone();
        Box::pin(async move {
            let request = KadRequest::GetProviders { cid };
            match network.send_request(&contact.peer_id, request).await {
                Ok(response) => {
                    {
                        let mut guard = found.lock().await;
                        let mut seen: HashSet<PeerId> = guard.iter().cloned().collect();
                        for wire in &response.provider_peers {
                            if seen.insert(wire.id.clone()) {
                                guard.push(wire.id.clone());
                            }
                        }
                        if guard.len() >= count {
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
    /// `provide(cid)` (spec §4.I): announce to the k closest peers and
    /// remember locally.
    pub async fn provide(&self, cid: &[u8]) -> Result<(), KadError> {
        self.providers.add_provider(cid.to_vec(), self.local_peer_id.clone()).await;

        let peers = self.get_closest_peers(cid).await;
        if peers.is_empty() {
            return Err(KadError::LookupFailed);
        }

        let self_info = crate::protocol::WirePeerInfo {
            id: self.local_peer_id.clone(),
            addrs: vec![],
            connection: crate::peer::ConnectionState::Connected,
        };

        let mut sends = Vec::with_capacity(peers.len());
        for peer in peers {
            let network = self.network.clone();
            let cid = cid.to_vec();
            let provider = self_info.clone();
            sends.push(tokio::spawn(async move {
                network
                    .send_request(&peer, KadRequest::AddProvider { cid, provider })
                    .await
            }));
        }
        for send in sends {
            let _ = send.await;
        }
        debug!(cid = ?cid, "provide announced");
        Ok(())
    }

    /// `findProviders(cid, count, timeout)` (spec §4.I).
    pub async fn find_providers(&self, cid: &[u8], count: usize, timeout: Duration) -> Vec<PeerId> {
        let local: Vec<PeerId> = self.providers.get_providers(cid).await;
        let found = Arc::new(AsyncMutex::new(local));
        if found.lock().await.len() >= count {
            return found.lock().await.clone();
        }

        let target_id = KadId::of(cid);
        let seeds = self.routing_table.lock().await.closest_peers(&target_id, self.config.k);
        if seeds.is_empty() {
            return found.lock().await.clone();
        }

        let mut config = QueryConfig::from_dht_config(&self.config);
        config.timeout = timeout;
        let cancel = CancelToken::new();
        let query_fn = get_providers_query_fn(self.network.clone(), cid.to_vec(), count, found.clone(), cancel.clone());
        let outcome = query::run(target_id, seeds, config, query_fn, cancel).await;

        for contact in outcome.final_set {
            self.network.observe_contact(contact).await;
        }

        let mut result = found.lock().await.clone();
        result.truncate(count);
        result
    }
}
