//! Catalogue storage for nfstore.
//!
//! This crate provides the storage layer: a `CatalogueStore` of JSON documents grouped
//! into collections, each carrying a blake3 etag that doubles as the optimistic
//! concurrency token; a content-addressed `MediaStore` for the raw manifest and
//! attestation binaries; gzip-tar helpers shared by the archive inspector and the
//! orchestrator adapters; the `OnboardedEntity` document model; and `StoreLock` for
//! serializing compare-and-swap writes across threads and processes.

pub mod archive;
pub mod catalogue;
pub mod entity;
pub mod layout;
pub mod lock;
pub mod media;

pub use archive::{extract_tar_gz, is_tar_gz_file, join_within, pack_tar_gz, tar_gz_basename};
pub use catalogue::{validate_document_id, CatalogueStore, Collection, StoredDocument};
pub use entity::{ConstituentRef, EntityState, OnboardedEntity};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use media::MediaStore;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until the parent
/// directory itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for '{id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("document not found in '{collection}': {id}")]
    DocumentNotFound { collection: Collection, id: String },
    #[error("document already exists in '{collection}': {id}")]
    AlreadyExists { collection: Collection, id: String },
    #[error("stale concurrency token for '{id}' in '{collection}'")]
    Conflict { collection: Collection, id: String },
    #[error("media not found: {0}")]
    MediaNotFound(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid document id: {0}")]
    InvalidId(String),
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_not_found() {
        let e = StoreError::DocumentNotFound {
            collection: Collection::Vnsfs,
            id: "cirros_vnfd".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("vnsfs"));
        assert!(msg.contains("cirros_vnfd"));
    }

    #[test]
    fn store_error_display_conflict() {
        let e = StoreError::Conflict {
            collection: Collection::NetworkServices,
            id: "ns1".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("stale"));
        assert!(msg.contains("ns1"));
    }

    #[test]
    fn store_error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 1,
            found: 7,
        };
        let msg = e.to_string();
        assert!(msg.contains('1'));
        assert!(msg.contains('7'));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            id: "h".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }
}
