//! Wire message types (spec §4.E, §6).

use serde::{Deserialize, Serialize};

use crate::peer::{Address, ConnectionState, PeerId, PeerInfo};
use crate::record::Record;

/// The legacy `clusterLevel` field, clamped to `[0, 10]` (spec §4.E:
/// "clusterLevel: varint (legacy, clamped to [0,10])"). Carried for wire
/// compatibility; nothing in this crate reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLevel(u8);

impl ClusterLevel {
    pub fn new(level: u8) -> Self {
        ClusterLevel(level.min(10))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for ClusterLevel {
    fn default() -> Self {
        ClusterLevel(0)
    }
}

/// Peer info as exchanged on the wire: id, known addresses, connection
/// state (spec §6: "Peer-info: {id, addrs, connection}").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePeerInfo {
    pub id: PeerId,
    pub addrs: Vec<Address>,
    pub connection: ConnectionState,
}

impl From<PeerInfo> for WirePeerInfo {
    fn from(info: PeerInfo) -> Self {
        WirePeerInfo {
            id: info.peer_id,
            addrs: info.addresses,
            connection: info.connection,
        }
    }
}

impl From<WirePeerInfo> for PeerInfo {
    fn from(wire: WirePeerInfo) -> Self {
        PeerInfo {
            peer_id: wire.id,
            addresses: wire.addrs,
            connection: wire.connection,
        }
    }
}

/// One request message, one response message, per stream (spec §4.E).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KadRequest {
    Ping,
    /// `target` is the already-hashed 32-byte `KadId` digest being
    /// sought, never a raw preimage — a responder only ever needs to
    /// compute XOR distance against it, whether the caller is routing
    /// towards a peer id (`findPeer`) or an arbitrary key
    /// (`getClosestPeers`/bucket refresh) (spec §4.G: "each path's
    /// `queryPeer` sends `FIND_NODE(target)`").
    FindNode { target: Vec<u8> },
    GetValue { key: Vec<u8> },
    PutValue { record: Record },
    AddProvider { cid: Vec<u8>, provider: WirePeerInfo },
    GetProviders { cid: Vec<u8> },
}

impl KadRequest {
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            KadRequest::GetValue { key } => Some(key),
            KadRequest::PutValue { record } => Some(&record.key),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KadResponse {
    pub record: Option<Record>,
    pub closer_peers: Vec<WirePeerInfo>,
    pub provider_peers: Vec<WirePeerInfo>,
    pub cluster_level: ClusterLevel,
}

impl KadResponse {
    pub fn empty() -> Self {
        KadResponse {
            record: None,
            closer_peers: vec![],
            provider_peers: vec![],
            cluster_level: ClusterLevel::default(),
        }
    }

    pub fn with_closer_peers(mut self, peers: Vec<WirePeerInfo>) -> Self {
        self.closer_peers = peers;
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_provider_peers(mut self, peers: Vec<WirePeerInfo>) -> Self {
        self.provider_peers = peers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn cluster_level_clamps_above_ten() {
        assert_eq!(ClusterLevel::new(3).get(), 3);
        assert_eq!(ClusterLevel::new(10).get(), 10);
        assert_eq!(ClusterLevel::new(255).get(), 10);
        assert_eq!(ClusterLevel::default().get(), 0);
    }

    #[test]
    fn wire_peer_info_round_trips_through_peer_info() {
        let info = PeerInfo::new(PeerId::new(vec![7]), vec![Address::new("mem", "a")]);
        let wire: WirePeerInfo = info.clone().into();
        let back: PeerInfo = wire.into();
        assert_eq!(back, info);
    }

    #[test]
    fn request_key_extracts_from_get_and_put_only() {
        let key = b"/test/k".to_vec();
        assert_eq!(KadRequest::GetValue { key: key.clone() }.key(), Some(key.as_slice()));
        let record = Record::new(key.clone(), b"v".to_vec());
        assert_eq!(KadRequest::PutValue { record }.key(), Some(key.as_slice()));
        assert_eq!(KadRequest::Ping.key(), None);
        assert_eq!(KadRequest::FindNode { target: vec![1] }.key(), None);
    }

    #[test]
    fn empty_response_has_no_record_or_peers() {
        let response = KadResponse::empty();
        assert!(response.record.is_none());
        assert!(response.closer_peers.is_empty());
        assert!(response.provider_peers.is_empty());
    }
}
