use crate::layout::StoreLayout;
use crate::lock::StoreLock;
use crate::{fsync_dir, StoreError};
use nfstore_schema::{EntityKind, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;

/// Document collections of the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Vnsfs,
    NetworkServices,
    Validations,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Vnsfs,
        Collection::NetworkServices,
        Collection::Validations,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Collection::Vnsfs => "vnsfs",
            Collection::NetworkServices => "ns",
            Collection::Validations => "validation",
        }
    }

    /// The collection onboarded entities of `kind` live in.
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Vnsf => Collection::Vnsfs,
            EntityKind::Ns => Collection::NetworkServices,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A catalogue document together with its bookkeeping fields.
///
/// `etag` is a blake3 checksum over everything else, so it changes on every write
/// (`revision` and `updated_at` always move) and is the concurrency token callers
/// must present to `update` and `delete`. It is verified on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: RecordId,
    pub revision: u64,
    pub created_at: String,
    pub updated_at: String,
    pub document: Value,
    #[serde(default)]
    pub etag: String,
}

impl StoredDocument {
    fn compute_etag(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.etag = String::new();
        let json = serde_json::to_string(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Deserialize the document body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.document.clone())?)
    }
}

pub fn validate_document_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.len() > 128 {
        return Err(StoreError::InvalidId(format!(
            "'{id}': document id must be 1-128 characters"
        )));
    }
    if id.starts_with('.') {
        return Err(StoreError::InvalidId(format!(
            "'{id}': document id must not start with '.'"
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(StoreError::InvalidId(format!(
            "'{id}': document id must match [a-zA-Z0-9_.-]"
        )));
    }
    Ok(())
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// 24 hex characters derived from the content, the clock, and a process-local counter.
fn generate_id(document: &Value) -> Result<String, StoreError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(serde_json::to_string(document)?.as_bytes());
    hasher.update(now().as_bytes());
    hasher.update(&ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    Ok(hex[..24].to_owned())
}

/// JSON document store with per-document optimistic concurrency.
///
/// Documents are files under `documents/<collection>/<id>`, written atomically via
/// `NamedTempFile` + rename. Every mutation runs under the catalogue [`StoreLock`] so
/// that the token comparison and the write form one step; reads take no lock.
#[derive(Debug, Clone)]
pub struct CatalogueStore {
    layout: StoreLayout,
}

impl CatalogueStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Initialize the layout under `root` and open the store.
    pub fn open(root: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        Ok(Self::new(layout))
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Create a document under a locally generated id.
    pub fn create(
        &self,
        collection: Collection,
        document: Value,
    ) -> Result<StoredDocument, StoreError> {
        let id = generate_id(&document)?;
        self.create_with_id(collection, &id, document)
    }

    /// Create a document under a caller-chosen id. Fails if the id is taken.
    pub fn create_with_id(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<StoredDocument, StoreError> {
        validate_document_id(id)?;
        let _lock = StoreLock::acquire(&self.layout.lock_file())?;

        if self.exists(collection, id) {
            return Err(StoreError::AlreadyExists {
                collection,
                id: id.to_owned(),
            });
        }

        let timestamp = now();
        let stored = StoredDocument {
            id: RecordId::new(id),
            revision: 1,
            created_at: timestamp.clone(),
            updated_at: timestamp,
            document,
            etag: String::new(),
        };
        let stored = self.write(collection, stored)?;
        tracing::debug!("created {collection}/{id} etag={}", &stored.etag[..12]);
        Ok(stored)
    }

    pub fn exists(&self, collection: Collection, id: &str) -> bool {
        validate_document_id(id).is_ok() && self.layout.document_path(collection, id).is_file()
    }

    pub fn get(&self, collection: Collection, id: &str) -> Result<StoredDocument, StoreError> {
        validate_document_id(id)?;
        let path = self.layout.document_path(collection, id);
        if !path.is_file() {
            return Err(StoreError::DocumentNotFound {
                collection,
                id: id.to_owned(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let stored: StoredDocument = serde_json::from_str(&content)?;

        let actual = stored.compute_etag()?;
        if actual != stored.etag {
            return Err(StoreError::IntegrityFailure {
                id: format!("{collection}/{id}"),
                expected: stored.etag,
                actual,
            });
        }
        Ok(stored)
    }

    /// All documents whose top-level string field `field` equals `value`.
    pub fn get_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .list(collection)?
            .into_iter()
            .filter(|d| d.document.get(field).and_then(Value::as_str) == Some(value))
            .collect())
    }

    /// All readable documents of a collection, sorted by id. Corrupted entries are
    /// skipped with a warning.
    pub fn list(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        let dir = self.layout.collection_dir(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match self.get(collection, name) {
                Ok(doc) => results.push(doc),
                Err(e) => {
                    tracing::warn!("skipping corrupted document '{collection}/{name}': {e}");
                }
            }
        }
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }

    /// Replace a document's body if `token` matches its current etag.
    pub fn update(
        &self,
        collection: Collection,
        id: &str,
        token: &str,
        document: Value,
    ) -> Result<StoredDocument, StoreError> {
        let _lock = StoreLock::acquire(&self.layout.lock_file())?;
        let current = self.checked_current(collection, id, token)?;
        let next = StoredDocument {
            id: current.id,
            revision: current.revision + 1,
            created_at: current.created_at,
            updated_at: now(),
            document,
            etag: String::new(),
        };
        let stored = self.write(collection, next)?;
        tracing::debug!(
            "updated {collection}/{id} to revision {} etag={}",
            stored.revision,
            &stored.etag[..12]
        );
        Ok(stored)
    }

    /// Physically remove a document if `token` matches its current etag.
    pub fn delete(&self, collection: Collection, id: &str, token: &str) -> Result<(), StoreError> {
        let _lock = StoreLock::acquire(&self.layout.lock_file())?;
        self.checked_current(collection, id, token)?;
        fs::remove_file(self.layout.document_path(collection, id))?;
        fsync_dir(&self.layout.collection_dir(collection))?;
        tracing::debug!("deleted {collection}/{id}");
        Ok(())
    }

    fn checked_current(
        &self,
        collection: Collection,
        id: &str,
        token: &str,
    ) -> Result<StoredDocument, StoreError> {
        let current = self.get(collection, id)?;
        if current.etag != token {
            return Err(StoreError::Conflict {
                collection,
                id: id.to_owned(),
            });
        }
        Ok(current)
    }

    fn write(
        &self,
        collection: Collection,
        mut stored: StoredDocument,
    ) -> Result<StoredDocument, StoreError> {
        stored.etag = stored.compute_etag()?;
        let content = serde_json::to_string_pretty(&stored)?;

        let dir = self.layout.collection_dir(collection);
        let dest = dir.join(stored.id.as_str());
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(stored)
    }
}
