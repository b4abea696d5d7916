//! `Record` and the local record store (spec §4.C).

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::peer::PeerId;
use crate::record::validator::ValidatorRegistry;
use crate::record::RecordStoreError;

/// A signed key/value record (spec §3: "Record").
///
/// Keys are opaque byte strings except for the reserved `/pk/<peerid>`
/// prefix, which stores a peer's public key (spec §4.C, §6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub time_received: SystemTime,
    pub author: Option<PeerId>,
    pub signature: Option<Vec<u8>>,
}

impl Record {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Record {
            key,
            value,
            time_received: SystemTime::now(),
            author: None,
            signature: None,
        }
    }

    pub fn with_author(mut self, author: PeerId) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn age(&self) -> Duration {
        self.time_received.elapsed().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}

/// Local key/value record storage, validated and selected through an
/// external [`ValidatorRegistry`].
///
/// Kept as a trait (spec §1: "the persistent key/value backing store" is
/// an external collaborator) so an embedding application can swap in its
/// own disk-backed implementation; this crate ships [`MemoryRecordStore`]
/// for tests and for applications happy with an in-memory cache,
/// following `RecordStore`/`MemoryRecordStore` in
/// `ant-node/src/networking/kad/record_store.rs`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Validate then store `record`. Replaces any existing record for the
    /// same key — selection among multiple validated candidates happens
    /// on read, not on write (spec §4.C).
    async fn put(&self, record: Record, registry: &ValidatorRegistry) -> Result<(), RecordStoreError>;

    /// The freshest, non-expired, validated record for `key`, if any.
    async fn get(&self, key: &[u8], ttl: Duration, registry: &ValidatorRegistry) -> Option<Record>;

    /// Up to `n` non-expired, validated records for `key`, newest first.
    async fn get_many(&self, key: &[u8], n: usize, ttl: Duration) -> Vec<Record>;

    /// Every key with at least one stored record (expired or not).
    async fn keys(&self) -> Vec<Vec<u8>>;

    /// Drop every entry older than `ttl` (spec §4.K: "cleanup").
    async fn cleanup(&self, ttl: Duration);

    /// All records currently stored for `key`, regardless of validity or
    /// TTL — used by maintenance to re-PUT locally authored records.
    async fn raw_records(&self, key: &[u8]) -> Vec<Record>;
}

struct Slot {
    records: Vec<Record>,
}

/// An in-memory [`RecordStore`]. Multiple validated records per key may
/// coexist (e.g. concurrent puts from different authors); the selector
/// picks the winner on read.
pub struct MemoryRecordStore {
    records: tokio::sync::RwLock<HashMap<Vec<u8>, Slot>>,
    max_records_per_key: usize,
}

impl MemoryRecordStore {
    pub fn new(max_records_per_key: usize) -> Self {
        MemoryRecordStore {
            records: tokio::sync::RwLock::new(HashMap::new()),
            max_records_per_key,
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        MemoryRecordStore::new(16)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record: Record, registry: &ValidatorRegistry) -> Result<(), RecordStoreError> {
        registry.validate(&record.key, &record.value)?;
        let mut guard = self.records.write().await;
        let slot = guard.entry(record.key.clone()).or_insert_with(|| Slot { records: vec![] });
        slot.records.retain(|r| r.author != record.author || r.author.is_none());
        slot.records.push(record.clone());
        if slot.records.len() > self.max_records_per_key {
            slot.records.remove(0);
        }
        debug!(key = ?record.key, "stored record");
        Ok(())
    }

    async fn get(&self, key: &[u8], ttl: Duration, registry: &ValidatorRegistry) -> Option<Record> {
        let guard = self.records.read().await;
        let slot = guard.get(key)?;
        let live: Vec<&Record> = slot.records.iter().filter(|r| !r.is_expired(ttl)).collect();
        if live.is_empty() {
            trace!(key = ?key, "all records expired");
            return None;
        }
        let selected = registry.select(key, &live);
        selected.cloned()
    }

    async fn get_many(&self, key: &[u8], n: usize, ttl: Duration) -> Vec<Record> {
        let guard = self.records.read().await;
        let Some(slot) = guard.get(key) else { return vec![] };
        let mut live: Vec<Record> = slot.records.iter().filter(|r| !r.is_expired(ttl)).cloned().collect();
        live.sort_by(|a, b| b.time_received.cmp(&a.time_received));
        live.truncate(n);
        live
    }

    async fn keys(&self) -> Vec<Vec<u8>> {
        self.records.read().await.keys().cloned().collect()
    }

    async fn cleanup(&self, ttl: Duration) {
        let mut guard = self.records.write().await;
        let mut removed = 0usize;
        guard.retain(|_, slot| {
            slot.records.retain(|r| !r.is_expired(ttl));
            if slot.records.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            warn!(removed, "cleaned up expired record keys");
        }
    }

    async fn raw_records(&self, key: &[u8]) -> Vec<Record> {
        self.records.read().await.get(key).map(|s| s.records.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryRecordStore::default();
        let registry = ValidatorRegistry::new();
        let record = Record::new(b"/test/hello".to_vec(), b"world".to_vec());
        store.put(record.clone(), &registry).await.unwrap();
        let fetched = store.get(b"/test/hello", Duration::from_secs(3600), &registry).await;
        assert_eq!(fetched.unwrap().value, b"world");
    }

    #[tokio::test]
    async fn expired_records_are_not_returned() {
        let store = MemoryRecordStore::default();
        let registry = ValidatorRegistry::new();
        let mut record = Record::new(b"k".to_vec(), b"v".to_vec());
        record.time_received = SystemTime::now() - Duration::from_secs(1000);
        store.put(record, &registry).await.unwrap();
        let fetched = store.get(b"k", Duration::from_secs(10), &registry).await;
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn cleanup_drops_expired_entries() {
        let store = MemoryRecordStore::default();
        let registry = ValidatorRegistry::new();
        let mut record = Record::new(b"k".to_vec(), b"v".to_vec());
        record.time_received = SystemTime::now() - Duration::from_secs(1000);
        store.put(record, &registry).await.unwrap();
        store.cleanup(Duration::from_secs(10)).await;
        assert!(store.keys().await.is_empty());
    }
}
