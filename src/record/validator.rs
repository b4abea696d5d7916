//! Validator/selector registry (spec §9: "Dynamic validator/selector
//! registry → interface abstraction").
//!
//! Two capability traits keyed by key-prefix: [`Validator::validate`]
//! accepts or rejects a candidate record; [`Selector::select`] picks the
//! "best" record among several already-valid candidates for the same
//! key. A built-in pair handles the reserved `/pk/` prefix so
//! `/pk/<peerid>` records work without any caller registration (spec
//! §4.C, §6).

use sha2::{Digest, Sha256};

use crate::record::store::Record;
use crate::record::RecordStoreError;

pub const PUBLIC_KEY_PREFIX: &[u8] = b"/pk/";

/// Accepts or rejects a candidate record for a given key.
pub trait Validator: Send + Sync {
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), RecordStoreError>;
}

/// Picks the preferred record among several already-valid candidates for
/// the same key. Must be deterministic regardless of input order (spec
/// invariant 5).
pub trait Selector: Send + Sync {
    fn select<'a>(&self, key: &[u8], records: &[&'a Record]) -> Option<&'a Record>;
}

/// `/pk/<peerid>` records: the value must be a public key whose SHA-256
/// digest equals the id in the key (spec invariant 6).
pub struct PublicKeyValidator;

impl Validator for PublicKeyValidator {
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), RecordStoreError> {
        let claimed_id = &key[PUBLIC_KEY_PREFIX.len()..];
        let digest = Sha256::digest(value);
        if digest.as_slice() == claimed_id {
            Ok(())
        } else {
            Err(RecordStoreError::InvalidPublicKey)
        }
    }
}

/// For `/pk/` keys there is only ever one valid record per spec §3, so
/// selection is trivial: the validator already guarantees at most one
/// distinct value could validate for a given id (a second, different
/// value would fail the hash check), so we just pick the most recent.
pub struct PublicKeySelector;

impl Selector for PublicKeySelector {
    fn select<'a>(&self, _key: &[u8], records: &[&'a Record]) -> Option<&'a Record> {
        records.iter().max_by_key(|r| r.time_received).copied()
    }
}

/// Default selector for ordinary (non-`/pk/`) keys: latest timestamp
/// wins, ties broken by the byte value of the record so the result is
/// deterministic regardless of input order (spec invariant 5).
pub struct LatestTimestampSelector;

impl Selector for LatestTimestampSelector {
    fn select<'a>(&self, _key: &[u8], records: &[&'a Record]) -> Option<&'a Record> {
        records
            .iter()
            .max_by(|a, b| a.time_received.cmp(&b.time_received).then_with(|| a.value.cmp(&b.value)))
            .copied()
    }
}

struct Entry {
    prefix: Vec<u8>,
    validator: Box<dyn Validator>,
    selector: Box<dyn Selector>,
}

/// Prefix-keyed lookup from a record key to the validator/selector pair
/// that governs it. The `/pk/` prefix is registered by default;
/// `register` adds more, most-specific-prefix-wins on lookup.
pub struct ValidatorRegistry {
    entries: Vec<Entry>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        ValidatorRegistry {
            entries: vec![Entry {
                prefix: PUBLIC_KEY_PREFIX.to_vec(),
                validator: Box::new(PublicKeyValidator),
                selector: Box::new(PublicKeySelector),
            }],
        }
    }

    /// Register a validator/selector pair for keys starting with `prefix`.
    pub fn register(&mut self, prefix: Vec<u8>, validator: Box<dyn Validator>, selector: Box<dyn Selector>) {
        self.entries.push(Entry { prefix, validator, selector });
    }

    fn lookup(&self, key: &[u8]) -> Option<&Entry> {
        self.entries
            .iter()
            .filter(|e| key.starts_with(&e.prefix))
            .max_by_key(|e| e.prefix.len())
    }

    /// Validate `value` for `key`. Keys with no registered validator are
    /// accepted unconditionally — most application keys carry no
    /// first-class schema at this layer.
    pub fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), RecordStoreError> {
        match self.lookup(key) {
            Some(entry) => entry.validator.validate(key, value),
            None => Ok(()),
        }
    }

    /// Select the best record among `records` for `key`. Falls back to
    /// [`LatestTimestampSelector`] when no selector is registered for the
    /// key's prefix.
    pub fn select<'a>(&self, key: &[u8], records: &[&'a Record]) -> Option<&'a Record> {
        match self.lookup(key) {
            Some(entry) => entry.selector.select(key, records),
            None => LatestTimestampSelector.select(key, records),
        }
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        ValidatorRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerId;

    #[test]
    fn public_key_validator_accepts_matching_hash() {
        let pubkey = b"some-public-key-bytes".to_vec();
        let id = Sha256::digest(&pubkey).to_vec();
        let key = [PUBLIC_KEY_PREFIX, &id].concat();
        let registry = ValidatorRegistry::new();
        assert!(registry.validate(&key, &pubkey).is_ok());
    }

    #[test]
    fn public_key_validator_rejects_mismatched_hash() {
        let pubkey = b"some-public-key-bytes".to_vec();
        let id = Sha256::digest(b"a different key").to_vec();
        let key = [PUBLIC_KEY_PREFIX, &id].concat();
        let registry = ValidatorRegistry::new();
        assert!(registry.validate(&key, &pubkey).is_err());
    }

    #[test]
    fn latest_timestamp_selector_is_order_independent() {
        let a = Record::new(b"k".to_vec(), b"a".to_vec()).with_author(PeerId::new(vec![1]));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = Record::new(b"k".to_vec(), b"b".to_vec()).with_author(PeerId::new(vec![2]));
        let forward = LatestTimestampSelector.select(b"k", &[&a, &b]);
        let backward = LatestTimestampSelector.select(b"k", &[&b, &a]);
        assert_eq!(forward.map(|r| &r.value), backward.map(|r| &r.value));
        assert_eq!(forward.unwrap().value, b"b");
    }

    #[test]
    fn quickcheck_selector_is_order_independent() {
        fn prop(entries: Vec<(u32, u8)>) -> bool {
            if entries.is_empty() {
                return true;
            }
            let records: Vec<Record> = entries
                .iter()
                .map(|&(millis, value)| {
                    let mut record = Record::new(b"k".to_vec(), vec![value]);
                    record.time_received = std::time::UNIX_EPOCH + std::time::Duration::from_millis(millis as u64);
                    record
                })
                .collect();

            let forward: Vec<&Record> = records.iter().collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let a = LatestTimestampSelector.select(b"k", &forward);
            let b = LatestTimestampSelector.select(b"k", &reversed);
            a.map(|r| (r.time_received, r.value.clone())) == b.map(|r| (r.time_received, r.value.clone()))
        }
        quickcheck::quickcheck(prop as fn(Vec<(u32, u8)>) -> bool);
    }
}
