//! Shared harness for the end-to-end tests in this directory: an
//! in-process mock `Transport` that routes requests directly between
//! `KadDht` instances living in the same test binary, standing in for
//! the real stream transport spec §1 excludes from this crate's scope.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use kad_dht::config::Config;
use kad_dht::dht::KadDht;
use kad_dht::error::KadError;
use kad_dht::network::{AddressBook, Transport};
use kad_dht::peer::{Address, PeerId, PeerInfo};
use kad_dht::protocol::{KadRequest, KadResponse};
use kad_dht::record::MemoryRecordStore;

pub type Node = Arc<KadDht<MockTransport, MemoryRecordStore>>;

/// The shared "wire": a registry of every node in the simulated network,
/// plus a set of peers temporarily treated as unreachable (for exercising
/// timeout/failure paths without real I/O delay).
pub struct MockNetwork {
    nodes: AsyncMutex<HashMap<PeerId, Node>>,
    unreachable: AsyncMutex<HashSet<PeerId>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(MockNetwork {
            nodes: AsyncMutex::new(HashMap::new()),
            unreachable: AsyncMutex::new(HashSet::new()),
        })
    }

    pub async fn register(&self, node: Node) {
        self.nodes.lock().await.insert(node.local_peer_id().clone(), node);
    }

    pub async fn set_unreachable(&self, peer: PeerId) {
        self.unreachable.lock().await.insert(peer);
    }

    pub async fn set_reachable(&self, peer: &PeerId) {
        self.unreachable.lock().await.remove(peer);
    }
}

pub struct MockTransport {
    local: PeerId,
    net: Arc<MockNetwork>,
}

impl MockTransport {
    pub fn new(local: PeerId, net: Arc<MockNetwork>) -> Self {
        MockTransport { local, net }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_peer_id(&self) -> PeerId {
        self.local.clone()
    }

    async fn send_request(&self, peer: &PeerId, request: KadRequest) -> Result<KadResponse, KadError> {
        if self.net.unreachable.lock().await.contains(peer) {
            return Err(KadError::Transport("simulated: peer unreachable".into()));
        }
        let node = self.net.nodes.lock().await.get(peer).cloned();
        match node {
            Some(node) => Ok(node.handle_request(&self.local, request).await),
            None => Err(KadError::Transport("simulated: no such peer".into())),
        }
    }

    async fn send_message(&self, peer: &PeerId, request: KadRequest) -> Result<(), KadError> {
        self.send_request(peer, request).await.map(|_| ())
    }
}

#[derive(Default)]
pub struct MockAddressBook {
    entries: AsyncMutex<HashMap<PeerId, PeerInfo>>,
}

#[async_trait]
impl AddressBook for MockAddressBook {
    async fn add(&self, peer_id: PeerId, addresses: Vec<Address>) {
        self.entries.lock().await.insert(peer_id.clone(), PeerInfo::new(peer_id, addresses));
    }

    async fn get(&self, peer_id: &PeerId) -> Option<PeerInfo> {
        self.entries.lock().await.get(peer_id).cloned()
    }
}

pub fn peer(i: usize) -> PeerId {
    PeerId::new(format!("peer-{i}").into_bytes())
}

pub async fn make_node(net: &Arc<MockNetwork>, i: usize, config: Config) -> Node {
    let id = peer(i);
    let transport = Arc::new(MockTransport::new(id, net.clone()));
    let node = KadDht::with_memory_store(transport, Arc::new(MockAddressBook::default()), config);
    net.register(node.clone()).await;
    node
}

/// Teach `from` about `to`'s existence, one-directional: `to` is not told
/// about `from` in return. Used to build asymmetric topologies (the ring
/// scenario) where discovery must happen dynamically through queries.
pub async fn link_one_way(from: &Node, to: &Node) {
    from.add_address(to.local_peer_id().clone(), vec![]).await;
}

/// Teach `a` and `b` about each other.
pub async fn link(a: &Node, b: &Node) {
    link_one_way(a, b).await;
    link_one_way(b, a).await;
}
