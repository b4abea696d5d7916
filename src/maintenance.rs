//! Component K: the periodic maintenance loops (spec §4.K).
//!
//! Each loop is its own `tokio::task` bound to the `KadDht`'s lifetime,
//! generalizing `start_background_tasks`/`tasks: Vec<JoinHandle<()>>` in
//! `ant-node/src/networking/kad/behaviour.rs` from the teacher's single
//! bootstrap-and-cleanup pair to the four loops spec §4.K and §9 call
//! for ("All maintenance loops bind to its lifetime and stop on
//! shutdown").

use std::sync::Arc;

use rand::RngCore;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, info};

use crate::dht::KadDht;
use crate::id::KadId;
use crate::network::Transport;
use crate::record::RecordStore;

/// A random `KadId` sharing exactly `shared_bits` leading bits with
/// `local` — i.e. one that falls in the bucket at index `shared_bits`
/// (spec §4.K: "pick a random ID in that bucket's prefix").
fn random_id_in_bucket(local: &KadId, shared_bits: usize) -> KadId {
    let mut bytes = *local.as_bytes();
    let mut rng = rand::thread_rng();

    let flip_byte = shared_bits / 8;
    if flip_byte >= bytes.len() {
        return KadId::from_digest(bytes);
    }
    // Bit index within the byte, MSB-first (0 = most significant bit).
    let i = shared_bits % 8;
    let bit_mask: u8 = 1 << (7 - i);
    // Bits more significant than `i` must stay equal to `local`'s; bits
    // less significant than `i` are randomized; bit `i` itself flips.
    let high_mask: u8 = if i == 0 { 0 } else { 0xFFu8 << (8 - i) };
    let random_mask: u8 = !(high_mask | bit_mask);

    let mut random_byte = 0u8;
    rng.fill_bytes(std::slice::from_mut(&mut random_byte));
    let original = bytes[flip_byte];
    let flipped_bit = (original ^ bit_mask) & bit_mask;
    bytes[flip_byte] = (original & high_mask) | flipped_bit | (random_byte & random_mask);

    if flip_byte + 1 < bytes.len() {
        rng.fill_bytes(&mut bytes[flip_byte + 1..]);
    }

    KadId::from_digest(bytes)
}

/// Spawn the four maintenance loops and return their join handles. Always
/// exactly four, so a `SmallVec` avoids the heap allocation a `Vec` would
/// need for a list this small and this fixed.
pub(crate) fn spawn_all<T: Transport + 'static, R: RecordStore + 'static>(
    dht: Arc<KadDht<T, R>>,
) -> SmallVec<[tokio::task::JoinHandle<()>; 4]> {
    smallvec![
        tokio::spawn(bucket_refresh_loop(dht.clone())),
        tokio::spawn(record_republish_loop(dht.clone())),
        tokio::spawn(provider_republish_loop(dht.clone())),
        tokio::spawn(cleanup_loop(dht)),
    ]
}

async fn bucket_refresh_loop<T: Transport + 'static, R: RecordStore + 'static>(dht: Arc<KadDht<T, R>>) {
    let mut ticker = tokio::time::interval(dht.config.bucket_refresh_interval);
    loop {
        ticker.tick().await;
        let stale_buckets = dht.routing_table.lock().await.buckets_needing_refresh(dht.config.bucket_refresh_interval);
        for bucket in stale_buckets {
            let target = random_id_in_bucket(&dht.local_id, bucket);
            debug!(bucket, "refreshing stale bucket");
            let _ = dht.get_closest_peers_by_id(target).await;
        }
    }
}

async fn record_republish_loop<T: Transport + 'static, R: RecordStore + 'static>(dht: Arc<KadDht<T, R>>) {
    let mut ticker = tokio::time::interval(dht.config.record_republish_interval);
    loop {
        ticker.tick().await;
        for key in dht.record_store.keys().await {
            let authored: Vec<_> = dht
                .record_store
                .raw_records(&key)
                .await
                .into_iter()
                .filter(|r| r.author.as_ref() == Some(&dht.local_peer_id))
                .collect();
            for record in authored {
                let _ = dht.put(&record.key, record.value).await;
            }
        }
        info!("record republish sweep complete");
    }
}

async fn provider_republish_loop<T: Transport + 'static, R: RecordStore + 'static>(dht: Arc<KadDht<T, R>>) {
    let mut ticker = tokio::time::interval(dht.config.provider_republish_interval);
    loop {
        ticker.tick().await;
        let cids = dht.providers.provided_cids(&dht.local_peer_id).await;
        for cid in cids {
            let _ = dht.provide(&cid).await;
        }
        info!("provider republish sweep complete");
    }
}

async fn cleanup_loop<T: Transport + 'static, R: RecordStore + 'static>(dht: Arc<KadDht<T, R>>) {
    let mut ticker = tokio::time::interval(dht.config.cleanup_interval);
    loop {
        ticker.tick().await;
        dht.record_store.cleanup(dht.config.record_ttl).await;
        dht.providers.gc().await;
    }
}
