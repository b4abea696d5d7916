//! Shared types for k-bucket insertion results and routing-table events.

use crate::peer::PeerId;

/// Outcome of [`super::bucket::KBucket::insert`].
///
/// Mirrors `InsertResult` in `ant-node/src/networking/kad/kbucket.rs`,
/// trimmed to the cases spec §4.B actually specifies: insertion never
/// fails from the caller's point of view, it just may be a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// The bucket had room, or the peer was already present and was
    /// refreshed.
    Inserted,
    /// The bucket was full and every entry was live; the new peer was
    /// placed in the replacement cache instead (spec §4.B: "`add` never
    /// fails... it may be a no-op if the bucket is full and the incumbent
    /// is live").
    Full,
    /// The peer was ignored because it is our own id.
    Ignored,
}

/// An observable change to the routing table, delivered on the event
/// stream `closestPeers`'s caller can subscribe to (spec §4.B: "an event
/// stream for added/removed peers").
#[derive(Debug, Clone)]
pub enum RoutingEvent {
    Added { peer: PeerId, bucket: usize },
    Removed { peer: PeerId, bucket: usize },
    Evicted { evicted: PeerId, inserted: PeerId, bucket: usize },
}
