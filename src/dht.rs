//! The top-level handle wiring every component together (spec §2's
//! dependency-order component table, glued into one instance).
//!
//! Generic over a `Transport` and a `RecordStore`, following the
//! `Kademlia<T, S>` shape of `ant-node/src/networking/kad/behaviour.rs`;
//! the command-channel `KadDhtHandle` alongside direct async methods
//! mirrors that file's `KademliaHandle` built on top of `Kademlia<T, S>`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::info;

use crate::config::Config;
use crate::error::KadError;
use crate::id::KadId;
use crate::kbucket::RoutingTable;
use crate::network::{AddressBook, Network, Transport};
use crate::peer::{Address, Contact, PeerId};
use crate::provider::ProviderStore;
use crate::record::{MemoryRecordStore, Record, RecordStore, ValidatorRegistry};

/// Everything one local Kademlia participant owns (spec §9: "The DHT
/// instance is process-wide but explicitly constructed; no hidden
/// singletons").
pub struct KadDht<T: Transport, R: RecordStore> {
    pub(crate) local_peer_id: PeerId,
    pub(crate) local_id: KadId,
    pub(crate) routing_table: Arc<Mutex<RoutingTable>>,
    pub(crate) network: Arc<Network<T>>,
    pub(crate) record_store: Arc<R>,
    pub(crate) validators: Arc<ValidatorRegistry>,
    pub(crate) providers: Arc<ProviderStore>,
    pub(crate) address_book: Arc<dyn AddressBook>,
    pub(crate) config: Config,
}

impl<T: Transport + 'static, R: RecordStore + 'static> KadDht<T, R> {
    pub fn new(
        transport: Arc<T>,
        record_store: Arc<R>,
        address_book: Arc<dyn AddressBook>,
        config: Config,
    ) -> Arc<Self> {
        let local_peer_id = transport.local_peer_id();
        let local_id = local_peer_id.kad_id();
        let (routing_table, _events) = RoutingTable::new(local_id, config.k, config.bucket_refresh_interval * 3);
        let routing_table = Arc::new(Mutex::new(routing_table));
        let network = Arc::new(Network::new(
            transport,
            routing_table.clone(),
            config.request_timeout,
            config.max_inflight_per_peer,
        ));

        Arc::new(KadDht {
            local_peer_id,
            local_id,
            routing_table,
            network,
            record_store,
            validators: Arc::new(ValidatorRegistry::new()),
            providers: Arc::new(ProviderStore::new(config.provider_ttl)),
            address_book,
            config,
        })
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    pub fn local_id(&self) -> &KadId {
        &self.local_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Learn about a peer's addresses and add it as a routing-table
    /// candidate. Not itself an RPC: the contact is only ever marked live
    /// once a request to it actually succeeds (spec §4.B: "every contact
    /// stored is reachable at insertion time").
    pub async fn add_address(&self, peer_id: PeerId, addresses: Vec<Address>) {
        self.address_book.add(peer_id.clone(), addresses.clone()).await;
        self.routing_table.lock().await.add(Contact::new(peer_id, addresses));
    }

    pub async fn routing_table_len(&self) -> usize {
        self.routing_table.lock().await.len()
    }

    /// Start the four maintenance loops (spec §4.K), each an independent
    /// `tokio::task` bound to `dht`'s lifetime.
    pub fn spawn_maintenance(dht: Arc<Self>) -> smallvec::SmallVec<[tokio::task::JoinHandle<()>; 4]> {
        crate::maintenance::spawn_all(dht)
    }
}

impl<T: Transport + 'static> KadDht<T, MemoryRecordStore> {
    /// Convenience constructor for the common case of an in-memory
    /// record store, mirroring `Kademlia::with_memory_store` in the
    /// teacher module.
    pub fn with_memory_store(transport: Arc<T>, address_book: Arc<dyn AddressBook>, config: Config) -> Arc<Self> {
        KadDht::new(transport, Arc::new(MemoryRecordStore::default()), address_book, config)
    }
}

/// Commands accepted by [`run`], mirroring `KadCommand` in
/// `ant-node/src/networking/kad/behaviour.rs`. Each direct method on
/// [`KadDht`] has a corresponding variant here purely for callers who
/// prefer a message-passing API over holding an `Arc<KadDht<_, _>>`
/// directly; both paths call the same underlying logic.
pub enum KadCommand {
    FindPeer {
        target: PeerId,
        timeout: Duration,
        reply: oneshot::Sender<Result<Contact, KadError>>,
    },
    GetClosestPeers {
        key: Vec<u8>,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    Provide {
        cid: Vec<u8>,
        reply: oneshot::Sender<Result<(), KadError>>,
    },
    FindProviders {
        cid: Vec<u8>,
        count: usize,
        timeout: Duration,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<(), KadError>>,
    },
    Get {
        key: Vec<u8>,
        timeout: Duration,
        reply: oneshot::Sender<Result<Record, KadError>>,
    },
    GetMany {
        key: Vec<u8>,
        n: usize,
        timeout: Duration,
        reply: oneshot::Sender<Vec<Record>>,
    },
    AddAddress {
        peer: PeerId,
        addresses: Vec<Address>,
    },
    Shutdown,
}

/// A cheaply-cloneable front for [`KadDht`] driven through a command
/// channel, matching `KademliaHandle` in the teacher module.
#[derive(Clone)]
pub struct KadDhtHandle {
    command_tx: mpsc::UnboundedSender<KadCommand>,
}

impl KadDhtHandle {
    pub async fn find_peer(&self, target: PeerId, timeout: Duration) -> Result<Contact, KadError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::FindPeer { target, timeout, reply });
        rx.await.unwrap_or(Err(KadError::Cancelled))
    }

    pub async fn get_closest_peers(&self, key: Vec<u8>) -> Vec<PeerId> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::GetClosestPeers { key, reply });
        rx.await.unwrap_or_default()
    }

    pub async fn provide(&self, cid: Vec<u8>) -> Result<(), KadError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::Provide { cid, reply });
        rx.await.unwrap_or(Err(KadError::Cancelled))
    }

    pub async fn find_providers(&self, cid: Vec<u8>, count: usize, timeout: Duration) -> Vec<PeerId> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::FindProviders { cid, count, timeout, reply });
        rx.await.unwrap_or_default()
    }

    pub async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KadError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::Put { key, value, reply });
        rx.await.unwrap_or(Err(KadError::Cancelled))
    }

    pub async fn get(&self, key: Vec<u8>, timeout: Duration) -> Result<Record, KadError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::Get { key, timeout, reply });
        rx.await.unwrap_or(Err(KadError::Cancelled))
    }

    pub async fn get_many(&self, key: Vec<u8>, n: usize, timeout: Duration) -> Vec<Record> {
        let (reply, rx) = oneshot::channel();
        let _ = self.command_tx.send(KadCommand::GetMany { key, n, timeout, reply });
        rx.await.unwrap_or_default()
    }

    pub fn add_address(&self, peer: PeerId, addresses: Vec<Address>) {
        let _ = self.command_tx.send(KadCommand::AddAddress { peer, addresses });
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(KadCommand::Shutdown);
    }
}

/// Spawn the command loop for `dht`, returning a handle to drive it.
pub fn spawn<T: Transport + 'static, R: RecordStore + 'static>(
    dht: Arc<KadDht<T, R>>,
) -> (KadDhtHandle, tokio::task::JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let join = tokio::spawn(run(dht, command_rx));
    (KadDhtHandle { command_tx }, join)
}

async fn run<T: Transport + 'static, R: RecordStore + 'static>(
    dht: Arc<KadDht<T, R>>,
    mut command_rx: mpsc::UnboundedReceiver<KadCommand>,
) {
    info!(peer = %dht.local_peer_id, "kad-dht command loop started");
    while let Some(command) = command_rx.recv().await {
        match command {
            KadCommand::FindPeer { target, timeout, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.find_peer(&target, timeout).await);
                });
            }
            KadCommand::GetClosestPeers { key, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.get_closest_peers(&key).await);
                });
            }
            KadCommand::Provide { cid, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.provide(&cid).await);
                });
            }
            KadCommand::FindProviders { cid, count, timeout, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.find_providers(&cid, count, timeout).await);
                });
            }
            KadCommand::Put { key, value, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.put(&key, value).await);
                });
            }
            KadCommand::Get { key, timeout, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.get(&key, timeout).await);
                });
            }
            KadCommand::GetMany { key, n, timeout, reply } => {
                let dht = dht.clone();
                tokio::spawn(async move {
                    let _ = reply.send(dht.get_many(&key, n, timeout).await);
                });
            }
            KadCommand::AddAddress { peer, addresses } => {
                dht.add_address(peer, addresses).await;
            }
            KadCommand::Shutdown => {
                info!("kad-dht command loop shutting down");
                break;
            }
        }
    }
}
