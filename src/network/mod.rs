//! Component F: the network layer (spec §4.F).
//!
//! Opens streams (via the external [`Transport`]), applies a per-request
//! timeout, and feeds the outcome back into the routing table as a
//! liveness update. This is the boundary spec §7 describes: "transport
//! errors are absorbed at F... they surface to the query as path
//! failures, not to the caller."

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{trace, warn};

use crate::error::KadError;
use crate::kbucket::RoutingTable;
use crate::peer::{Address, Contact, PeerId, PeerInfo};
use crate::protocol::{KadRequest, KadResponse};

/// Ability to open a bidirectional stream to a peer, write a framed
/// request, and read back a single framed response — or send a
/// fire-and-forget one-way message. An external collaborator (spec §1):
/// this crate only depends on the trait.
#[async_trait]
pub trait Transport: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    async fn send_request(&self, peer: &PeerId, request: KadRequest) -> Result<KadResponse, KadError>;

    async fn send_message(&self, peer: &PeerId, request: KadRequest) -> Result<(), KadError>;
}

/// Opaque mapping from peer id to known network addresses and,
/// optionally, a public key (spec §1, §9: "Peer-store coupling → explicit
/// port"). An external collaborator; the core never assumes this caches
/// public keys itself.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn add(&self, peer_id: PeerId, addresses: Vec<Address>);

    async fn get(&self, peer_id: &PeerId) -> Option<PeerInfo>;
}

/// Threshold of consecutive failures after which a contact is evicted
/// from the routing table (spec §4.B: "after a threshold it is
/// evicted").
pub const FAILURE_EVICTION_THRESHOLD: u32 = 3;

/// Wraps a [`Transport`] with the per-request timeout, per-peer
/// in-flight cap, and routing-table liveness feedback spec §4.F and §5
/// require ("per-peer in-flight RPCs ≤ a configured cap... enforced by
/// the network layer via a semaphore").
pub struct Network<T: Transport> {
    transport: Arc<T>,
    routing_table: Arc<Mutex<RoutingTable>>,
    request_timeout: Duration,
    max_inflight_per_peer: usize,
    inflight: Mutex<HashMap<PeerId, Arc<Semaphore>>>,
}

impl<T: Transport> Network<T> {
    pub fn new(
        transport: Arc<T>,
        routing_table: Arc<Mutex<RoutingTable>>,
        request_timeout: Duration,
        max_inflight_per_peer: usize,
    ) -> Self {
        Network {
            transport,
            routing_table,
            request_timeout,
            max_inflight_per_peer,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    async fn semaphore_for(&self, peer: &PeerId) -> Arc<Semaphore> {
        let mut guard = self.inflight.lock().await;
        guard
            .entry(peer.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_inflight_per_peer)))
            .clone()
    }

    /// `sendRequest`: open a stream, write the request, await exactly one
    /// response, bounded by the configured per-request timeout. Updates
    /// routing-table liveness on both success and failure.
    pub async fn send_request(&self, peer: &PeerId, request: KadRequest) -> Result<KadResponse, KadError> {
        let semaphore = self.semaphore_for(peer).await;
        let _permit = semaphore.acquire().await.map_err(|_| KadError::Cancelled)?;

        let result = tokio::time::timeout(self.request_timeout, self.transport.send_request(peer, request)).await;

        match result {
            Ok(Ok(response)) => {
                self.routing_table.lock().await.mark_live(peer);
                trace!(peer = %peer, "request succeeded");
                Ok(response)
            }
            Ok(Err(err)) => {
                self.mark_failed(peer).await;
                warn!(peer = %peer, error = %err, "request failed");
                Err(err)
            }
            Err(_) => {
                self.mark_failed(peer).await;
                warn!(peer = %peer, timeout = ?self.request_timeout, "request timed out");
                Err(KadError::Timeout(self.request_timeout))
            }
        }
    }

    /// `sendMessage`: fire-and-forget, no reply expected. Failures still
    /// count against liveness but are otherwise swallowed.
    pub async fn send_message(&self, peer: &PeerId, request: KadRequest) {
        if let Err(err) = self.transport.send_message(peer, request).await {
            self.mark_failed(peer).await;
            warn!(peer = %peer, error = %err, "one-way message failed");
        }
    }

    async fn mark_failed(&self, peer: &PeerId) {
        self.routing_table.lock().await.mark_failed(peer, FAILURE_EVICTION_THRESHOLD);
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.transport.local_peer_id()
    }

    /// Insert a freshly-learned contact into the routing table — called
    /// after any response that includes `closerPeers`/`providerPeers`.
    pub async fn observe_contact(&self, contact: Contact) {
        self.routing_table.lock().await.add(contact);
    }
}
