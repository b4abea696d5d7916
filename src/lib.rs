//! Transport-agnostic Kademlia DHT: the XOR routing table, the
//! disjoint-path iterative query engine, and the local record/provider
//! stores that back `findPeer`, `getClosestPeers`, `provide`,
//! `findProviders`, `put`, `get` and `getMany`.
//!
//! The stream transport, the peer address book, and the cryptographic
//! identity module are modeled as traits ([`network::Transport`],
//! [`network::AddressBook`]) this crate depends on but does not
//! implement.

pub mod config;
pub mod content;
pub mod dht;
pub mod error;
pub mod handler;
pub mod id;
pub mod kbucket;
pub mod maintenance;
pub mod network;
pub mod peer;
pub mod protocol;
pub mod provider;
pub mod query;
pub mod record;
pub mod routing;
pub mod value;

pub use config::{Config, Mode};
pub use dht::{spawn, KadCommand, KadDht, KadDhtHandle};
pub use error::KadError;
pub use id::{Distance, KadId};
pub use peer::{Address, Contact, ConnectionState, PeerId, PeerInfo};
