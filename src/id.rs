//! ID space and XOR distance (component A).
//!
//! All distance arithmetic operates on 256-bit [`KadId`]s derived by
//! SHA-256 from either a peer id's bytes or an arbitrary key's bytes. This
//! mapping is a contract shared by the routing table and the query engine:
//! both must agree on it or "closest" stops meaning anything.

use std::cmp::Ordering;
use std::fmt;

use sha2::{Digest, Sha256};

/// A point in the 256-bit Kademlia ID space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KadId([u8; 32]);

impl KadId {
    /// Wrap a raw 32-byte digest directly (used by tests and by callers who
    /// already hold a SHA-256 output).
    pub fn from_digest(bytes: [u8; 32]) -> Self {
        KadId(bytes)
    }

    /// Hash arbitrary bytes (a peer id's bytes, or a record key) into ID
    /// space via SHA-256, per spec §3.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(bytes.as_ref());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        KadId(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `distance(a,b) = a XOR b`, a 256-bit unsigned value.
    pub fn distance(&self, other: &KadId) -> Distance {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }
}

impl fmt::Debug for KadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KadId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for KadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// XOR distance between two [`KadId`]s.
///
/// Ordered lexicographically, most-significant byte first — this is the
/// unsigned big-endian integer comparison spec §4.A requires, and it is
/// also exactly what `Ord` on `[u8; 32]` already gives us, so `Distance`
/// derives it rather than hand-rolling a comparator.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; 32]);

impl Distance {
    /// Number of leading zero bits, i.e. the length of the shared prefix
    /// between the two ids that produced this distance. Used to pick a
    /// bucket index (spec §4.B).
    pub fn leading_zero_bits(&self) -> u32 {
        let mut zeros = 0u32;
        for byte in &self.0 {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(&self.0[..4]))
    }
}

/// Compare two ids by distance to a shared `target`. Convenience wrapper
/// used throughout the query engine and routing table to sort candidate
/// sets best-first (spec invariant 2: "closest-peers sortedness").
pub fn cmp_by_distance(target: &KadId, a: &KadId, b: &KadId) -> Ordering {
    a.distance(target).cmp(&b.distance(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = KadId::of(b"alice");
        let b = KadId::of(b"bob");
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn distance_zero_iff_equal() {
        let a = KadId::of(b"alice");
        let b = KadId::of(b"alice");
        let c = KadId::of(b"bob");
        assert!(a.distance(&b).is_zero());
        assert!(!a.distance(&c).is_zero());
    }

    #[test]
    fn leading_zero_bits_counts_shared_prefix() {
        let d = Distance([0, 0, 0b0000_1111, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(d.leading_zero_bits(), 20);
    }

    #[test]
    fn ordering_matches_unsigned_bytewise_compare() {
        let small = Distance([0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let large = Distance([0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(small < large);
    }

    #[test]
    fn quickcheck_distance_symmetry() {
        fn prop(a: Vec<u8>, b: Vec<u8>) -> bool {
            let ka = KadId::of(&a);
            let kb = KadId::of(&b);
            ka.distance(&kb) == kb.distance(&ka)
        }
        quickcheck::quickcheck(prop as fn(Vec<u8>, Vec<u8>) -> bool);
    }
}
