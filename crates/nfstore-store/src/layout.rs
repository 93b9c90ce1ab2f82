use crate::catalogue::Collection;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout of an nfstore catalogue.
///
/// ```text
/// <root>/catalogue/version
/// <root>/catalogue/.lock
/// <root>/catalogue/documents/<collection>/<id>
/// <root>/catalogue/media/<blake3>
/// ```
///
/// All subdirectories are created on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn catalogue_dir(&self) -> PathBuf {
        self.root.join("catalogue")
    }

    #[inline]
    pub fn documents_dir(&self) -> PathBuf {
        self.catalogue_dir().join("documents")
    }

    #[inline]
    pub fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.documents_dir().join(collection.dir_name())
    }

    #[inline]
    pub fn document_path(&self, collection: Collection, id: &str) -> PathBuf {
        self.collection_dir(collection).join(id)
    }

    #[inline]
    pub fn media_dir(&self) -> PathBuf {
        self.catalogue_dir().join("media")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.catalogue_dir().join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            fs::create_dir_all(self.collection_dir(collection))?;
        }
        fs::create_dir_all(self.media_dir())?;

        let version_path = self.catalogue_dir().join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let dir = self.catalogue_dir();
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&dir)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.catalogue_dir().join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}
