//! Component C: the local record store (spec §4.C).

mod store;
mod validator;

pub use store::{MemoryRecordStore, Record, RecordStore};
pub use validator::{PublicKeyValidator, Selector, Validator, ValidatorRegistry, PUBLIC_KEY_PREFIX};

use thiserror::Error;

/// Failures raised by the record store and its validator/selector layer.
///
/// Mirrors `RecordStoreError` in `ant-node/src/networking/kad/record_store.rs`,
/// trimmed to the cases this crate's store actually surfaces.
#[derive(Error, Debug, Clone)]
pub enum RecordStoreError {
    #[error("no validator registered rejected the record for key {0:?}")]
    ValidationFailed(Vec<u8>),

    #[error("record for key {0:?} exceeds the maximum record size")]
    TooLarge(Vec<u8>),

    #[error("record store is full")]
    StoreFull,

    #[error("public key record does not hash to the claimed peer id")]
    InvalidPublicKey,
}
