//! First pipeline stage: stage the upload and unpack it into a private tree.

use crate::CoreError;
use nfstore_store::{extract_tar_gz, is_tar_gz_file, StoreError};
use std::io::{self, Read};
use std::path::Path;
use tempfile::{Builder, TempDir, TempPath};
use tracing::{debug, warn};

/// A package as received from the caller.
pub struct UploadedPackage<R> {
    pub filename: String,
    pub stream: R,
}

impl<R: Read> UploadedPackage<R> {
    pub fn new(filename: impl Into<String>, stream: R) -> Self {
        Self {
            filename: filename.into(),
            stream,
        }
    }
}

/// The staged upload and its extracted contents.
///
/// Both live under the temp root and are removed when the tree is closed or dropped.
#[derive(Debug)]
pub struct ExtractedTree {
    upload: TempPath,
    dir: TempDir,
}

impl ExtractedTree {
    /// Root of the extracted package.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn upload_path(&self) -> &Path {
        &self.upload
    }

    /// Remove the staged upload and the extracted tree, logging instead of failing.
    pub fn close(self) {
        let Self { upload, dir } = self;
        let upload_path = upload.to_path_buf();
        if let Err(e) = upload.close() {
            warn!("failed to remove staged upload {}: {e}", upload_path.display());
        }
        let dir_path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!("failed to remove package tree {}: {e}", dir_path.display());
        }
    }
}

fn builder(prefix: &str) -> Builder<'_, 'static> {
    let mut builder = Builder::new();
    builder.prefix(prefix);
    builder
}

/// A fresh private directory under `temp_root` (or the system temp dir).
pub(crate) fn scratch_dir(prefix: &str, temp_root: Option<&Path>) -> io::Result<TempDir> {
    match temp_root {
        Some(root) => builder(prefix).tempdir_in(root),
        None => builder(prefix).tempdir(),
    }
}

/// Stage the upload and extract it.
///
/// A missing upload (or one without a filename) is `PackageMissing`; anything that is
/// not a non-empty gzip-compressed tar archive is `WrongPackageFormat`.
pub fn extract<R: Read>(
    upload: Option<UploadedPackage<R>>,
    temp_root: Option<&Path>,
) -> Result<ExtractedTree, CoreError> {
    let Some(mut upload) = upload else {
        return Err(CoreError::PackageMissing("no package part in request".to_owned()));
    };
    if upload.filename.trim().is_empty() {
        return Err(CoreError::PackageMissing("uploaded package has no filename".to_owned()));
    }

    let mut staged = match temp_root {
        Some(root) => builder("nfstore-upload-").tempfile_in(root)?,
        None => builder("nfstore-upload-").tempfile()?,
    };
    let size = io::copy(&mut upload.stream, &mut staged)?;
    staged.as_file().sync_all()?;
    let upload_path = staged.into_temp_path();
    debug!("staged upload '{}' ({size} bytes)", upload.filename);

    if !is_tar_gz_file(&upload_path) {
        return Err(CoreError::WrongPackageFormat(format!(
            "'{}' is not a gzip-compressed tar archive",
            upload.filename
        )));
    }

    let dir = scratch_dir("nfstore-pkg-", temp_root)?;
    extract_tar_gz(&upload_path, dir.path()).map_err(|e| match e {
        StoreError::InvalidArchive(msg) => CoreError::WrongPackageFormat(msg),
        other => CoreError::from(other),
    })?;

    Ok(ExtractedTree {
        upload: upload_path,
        dir,
    })
}
