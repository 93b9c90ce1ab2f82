use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use nfstore_schema::MediaRef;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Content-addressed store for binaries referenced from catalogue documents
/// (the raw manifest and the attestation file of a package).
///
/// Files are named by their blake3 hash, written atomically, and re-hashed on read.
#[derive(Debug, Clone)]
pub struct MediaStore {
    layout: StoreLayout,
}

impl MediaStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Store data and return its reference. Storing the same bytes twice is a no-op.
    pub fn put(&self, data: &[u8]) -> Result<MediaRef, StoreError> {
        let hash = blake3::hash(data).to_hex().to_string();
        let dir = self.layout.media_dir();
        let dest = dir.join(&hash);

        if dest.exists() {
            return Ok(MediaRef::new(hash));
        }

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(MediaRef::new(hash))
    }

    pub fn get(&self, media: &MediaRef) -> Result<Vec<u8>, StoreError> {
        let hash = media.as_str();
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::MediaNotFound(hash.to_owned()));
        }
        let path = self.layout.media_dir().join(hash);
        if !path.exists() {
            return Err(StoreError::MediaNotFound(hash.to_owned()));
        }
        let data = fs::read(&path)?;

        let actual = blake3::hash(&data).to_hex();
        if actual.as_str() != hash {
            return Err(StoreError::IntegrityFailure {
                id: hash.to_owned(),
                expected: hash.to_owned(),
                actual: actual.to_string(),
            });
        }
        Ok(data)
    }

    pub fn exists(&self, media: &MediaRef) -> bool {
        self.layout.media_dir().join(media.as_str()).is_file()
    }
}
