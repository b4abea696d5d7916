//! Component E's handler semantics (spec §4.E): how a local instance
//! answers an inbound request from a remote peer.
//!
//! This is the server side of the protocol; the rest of the crate only
//! ever plays the client side (`network::Network::send_request`). An
//! embedding `Transport` calls [`KadDht::handle_request`] when it receives
//! a framed request and writes the resulting response back on the same
//! stream — the per-request-type match below follows the shape of
//! `ant-node/src/networking/kad/protocol.rs`'s
//! `MessageValidator::validate_message`, generalized here into one direct
//! async method that builds a response instead of validating, since this
//! crate doesn't own a connection state machine itself.

use tracing::{debug, trace, warn};

use crate::dht::KadDht;
use crate::id::KadId;
use crate::network::Transport;
use crate::peer::PeerId;
use crate::protocol::{KadRequest, KadResponse, WirePeerInfo};
use crate::record::{Record, RecordStore};

impl<T: Transport + 'static, R: RecordStore + 'static> KadDht<T, R> {
    /// Answer one inbound request from `from` (spec §4.E's handler table).
    ///
    /// A client-mode instance (spec §6: "client mode: do not serve
    /// queries") still answers `FIND_NODE` with closer peers — it remains
    /// useful as a routing stepping stone — but never reports itself as a
    /// record or provider holder, and never accepts writes.
    pub async fn handle_request(&self, from: &PeerId, request: KadRequest) -> KadResponse {
        self.routing_table
            .lock()
            .await
            .add(crate::peer::Contact::new(from.clone(), vec![]));

        match request {
            KadRequest::Ping => KadResponse::empty(),

            KadRequest::FindNode { target } => {
                let closer = self.closer_peers_for_digest(&target).await;
                KadResponse::empty().with_closer_peers(closer)
            }

            KadRequest::GetValue { key } => {
                let closer = self.closer_peers_for_key(key.as_slice()).await;
                let mut response = KadResponse::empty().with_closer_peers(closer);
                if self.config.mode == crate::config::Mode::Server {
                    if let Some(record) = self.record_store.get(&key, self.config.record_ttl, &self.validators).await {
                        response = response.with_record(record);
                    }
                }
                response
            }

            KadRequest::PutValue { record } => {
                if self.config.mode == crate::config::Mode::Server {
                    if let Err(err) = self.store_inbound_record(record.clone()).await {
                        warn!(key = ?record.key, error = %err, "rejected inbound PUT_VALUE");
                    }
                } else {
                    trace!(key = ?record.key, "client mode: ignoring inbound PUT_VALUE");
                }
                KadResponse::empty().with_record(record)
            }

            KadRequest::AddProvider { cid, provider } => {
                if self.config.mode == crate::config::Mode::Server && provider.id == *from {
                    self.providers.add_provider(cid.clone(), provider.id).await;
                    debug!(cid = ?cid, provider = %from, "recorded provider");
                } else {
                    trace!(cid = ?cid, provider = %provider.id, sender = %from, "dropped ADD_PROVIDER");
                }
                KadResponse::empty()
            }

            KadRequest::GetProviders { cid } => {
                let closer = self.closer_peers_for_key(&cid).await;
                let providers = if self.config.mode == crate::config::Mode::Server {
                    self.providers.get_providers(&cid).await
                } else {
                    vec![]
                };
                let provider_peers = providers
                    .into_iter()
                    .map(|id| WirePeerInfo { id, addrs: vec![], connection: crate::peer::ConnectionState::NotConnected })
                    .collect();
                KadResponse::empty().with_closer_peers(closer).with_provider_peers(provider_peers)
            }
        }
    }

    /// `FIND_NODE`'s target arrives as the already-hashed 32-byte `KadId`
    /// digest (see `routing.rs`'s query functions); never hash it again.
    async fn closer_peers_for_digest(&self, target_bytes: &[u8]) -> Vec<WirePeerInfo> {
        let Ok(digest): Result<[u8; 32], _> = target_bytes.try_into() else {
            warn!(len = target_bytes.len(), "FIND_NODE target is not a 32-byte digest");
            return vec![];
        };
        self.closest_peers_wire(KadId::from_digest(digest)).await
    }

    /// `GET_VALUE`/`GET_PROVIDERS`'s key/cid arrive as raw, arbitrary-length
    /// bytes (spec §4.E); hash them into ID space before looking up
    /// closer peers.
    async fn closer_peers_for_key(&self, key_bytes: &[u8]) -> Vec<WirePeerInfo> {
        self.closest_peers_wire(KadId::of(key_bytes)).await
    }

    async fn closest_peers_wire(&self, target_id: KadId) -> Vec<WirePeerInfo> {
        self.routing_table
            .lock()
            .await
            .closest_peers(&target_id, self.config.k)
            .into_iter()
            .map(|c| WirePeerInfo { id: c.peer_id, addrs: c.addresses, connection: crate::peer::ConnectionState::NotConnected })
            .collect()
    }

    async fn store_inbound_record(&self, record: Record) -> Result<(), crate::error::KadError> {
        self.record_store.put(record, &self.validators).await?;
        Ok(())
    }
}
