//! Crate-wide error taxonomy.
//!
//! Each subsystem defines its own error enum; this module composes them into
//! the single [`KadError`] surfaced by public operations, following the
//! `KadError`/`RecordStoreError` split in the teacher module
//! (`ant-node/src/networking/kad/transport.rs`, `record_store.rs`).

use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::record::RecordStoreError;

/// Errors returned by public DHT operations.
///
/// Variant names follow the error taxonomy in spec §7: `lookup-failed`,
/// `not-found`, `timeout`, `invalid-record`, `invalid-public-key`,
/// `transport-error`, `cancelled`.
#[derive(Error, Debug, Clone)]
pub enum KadError {
    /// The routing table was empty or yielded no seed peers for a query.
    #[error("lookup failed: no peers available to seed the query")]
    LookupFailed,

    /// The query completed but no matching record or peer was found.
    #[error("not found")]
    NotFound,

    /// A per-request or overall query deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A record failed validation.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A `/pk/<id>` record's value did not hash to the claimed peer id.
    #[error("public key does not hash to the claimed peer id")]
    InvalidPublicKey,

    /// The transport failed to open a stream, or a read/write failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,

    /// Wire encoding/decoding failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Local record store failure.
    #[error(transparent)]
    Store(#[from] RecordStoreError),
}

impl KadError {
    /// True for errors that should be absorbed as a per-peer query-path
    /// failure rather than aborting the whole operation (spec §7:
    /// "transport errors are absorbed at F... they surface to the query as
    /// path failures, not to the caller").
    pub fn is_path_local(&self) -> bool {
        matches!(self, KadError::Transport(_) | KadError::Timeout(_))
    }
}
