//! Peer identity and contact information (spec §3: PeerID, Contact).
//!
//! `PeerId` is deliberately opaque — the multihash of a public key, per
//! spec §3 — and carries no address or liveness information itself; those
//! live in [`Contact`] / [`PeerInfo`], owned by the routing table and the
//! (external) address book respectively. This split mirrors
//! `KadPeerId`/`KadAddress`/`PeerInfo` in
//! `ant-node/src/networking/kad/transport.rs`.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::id::KadId;

/// Opaque peer identifier: the multihash bytes of a peer's public key.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Vec<u8>);

impl PeerId {
    pub fn new(bytes: Vec<u8>) -> Self {
        PeerId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Map this peer id into Kademlia ID space via SHA-256 (spec §4.A).
    pub fn kad_id(&self) -> KadId {
        KadId::of(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..self.0.len().min(8)]))
    }
}

/// A network address, transport-agnostic (could be a multiaddr, a
/// `SocketAddr`, an iroh node addr, ...). Opaque to everything in this
/// crate except the external `Transport`/`AddressBook` implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub protocol: String,
    pub value: String,
}

impl Address {
    pub fn new(protocol: impl Into<String>, value: impl Into<String>) -> Self {
        Address {
            protocol: protocol.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.value)
    }
}

/// Connection state as observed by the transport, echoed on the wire in
/// `closerPeers`/`providerPeers` entries (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    NotConnected,
    Connected,
    CanConnect,
    CannotConnect,
}

/// A peer plus the addresses and connection state learned about it —
/// the shape exchanged in `FIND_NODE`/`GET_VALUE`/`GET_PROVIDERS` replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub addresses: Vec<Address>,
    pub connection: ConnectionState,
}

impl PeerInfo {
    pub fn new(peer_id: PeerId, addresses: Vec<Address>) -> Self {
        PeerInfo {
            peer_id,
            addresses,
            connection: ConnectionState::NotConnected,
        }
    }
}

/// A routing-table entry: spec §3's `(PeerID, addresses, last-seen,
/// liveness)` tuple. The routing table owns liveness; the address book
/// owns addresses — but we cache the addresses we were told about at
/// insertion time so `closestPeers` can hand out dialable contacts without
/// a second lookup, same as `KBucketEntry` in the teacher module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub peer_id: PeerId,
    pub addresses: Vec<Address>,
    pub last_seen: Instant,
    pub failures: u32,
}

impl Contact {
    pub fn new(peer_id: PeerId, addresses: Vec<Address>) -> Self {
        Contact {
            peer_id,
            addresses,
            last_seen: Instant::now(),
            failures: 0,
        }
    }

    pub fn mark_live(&mut self) {
        self.last_seen = Instant::now();
        self.failures = 0;
    }

    pub fn mark_failed(&mut self) {
        self.failures += 1;
    }

    pub fn to_peer_info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.peer_id.clone(),
            addresses: self.addresses.clone(),
            connection: ConnectionState::NotConnected,
        }
    }
}
