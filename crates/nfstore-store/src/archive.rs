//! Gzip-compressed tar helpers.
//!
//! Both the archive inspector and the orchestrator adapters decide "is this a package?"
//! by content, never by file extension: [`is_tar_gz_file`] checks the gzip magic and then
//! walks every tar header. Extraction refuses entries that would land outside the target
//! directory.

use crate::StoreError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn check_tar_gz(path: &Path) -> Result<usize, StoreError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    file.read_exact(&mut magic)
        .map_err(|_| StoreError::InvalidArchive("file is too short".to_owned()))?;
    if magic != GZIP_MAGIC {
        return Err(StoreError::InvalidArchive("missing gzip magic".to_owned()));
    }

    let file = File::open(path)?;
    let mut ar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut count = 0;
    let entries = ar
        .entries()
        .map_err(|e| StoreError::InvalidArchive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| StoreError::InvalidArchive(e.to_string()))?;
        entry
            .path()
            .map_err(|e| StoreError::InvalidArchive(e.to_string()))?;
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| StoreError::InvalidArchive(e.to_string()))?;
        count += 1;
    }
    if count == 0 {
        return Err(StoreError::InvalidArchive("archive has no entries".to_owned()));
    }
    Ok(count)
}

/// Whether `path` holds a readable, non-empty gzip-compressed tar archive.
///
/// Reads the file from scratch on every call and keeps no state, so repeated calls on
/// the same file always agree.
pub fn is_tar_gz_file(path: &Path) -> bool {
    match check_tar_gz(path) {
        Ok(_) => true,
        Err(e) => {
            debug!("{} is not a tar.gz archive: {e}", path.display());
            false
        }
    }
}

/// Extract a gzip-compressed tar archive into `target_dir`.
///
/// Entries with `..` components are skipped and absolute paths are re-rooted under
/// `target_dir`; permissions and timestamps are not restored. Symbolic and hard links
/// are refused, so every extracted path is a real file or directory inside the tree.
pub fn extract_tar_gz(archive: &Path, target_dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(target_dir)?;
    let invalid = |e: io::Error| StoreError::InvalidArchive(format!("{}: {e}", archive.display()));

    let file = File::open(archive)?;
    let mut ar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    ar.set_preserve_permissions(false);
    ar.set_preserve_mtime(false);
    ar.set_unpack_xattrs(false);
    ar.set_overwrite(true);
    for entry in ar.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let path = entry.path().map_err(invalid)?;
            return Err(StoreError::InvalidArchive(format!(
                "{}: link entry '{}' is not allowed",
                archive.display(),
                path.display()
            )));
        }
        if !entry.unpack_in(target_dir).map_err(invalid)? {
            debug!("skipped archive entry outside the target directory");
        }
    }
    Ok(())
}

/// File name of `path` without its `.tar.gz` (or `.tgz`) suffix.
pub fn tar_gz_basename(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name
        .strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".tgz"))?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_owned())
    }
}

/// Join a package-relative path onto an extracted tree, refusing paths that are
/// absolute or climb out of `root`.
pub fn join_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut joined = root.to_path_buf();
    let mut parts = 0;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                parts += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (parts > 0).then_some(joined)
}

/// Create a deterministic gzip-compressed tar archive from a directory.
///
/// Entries are sorted by relative path, timestamps and ownership are zeroed, and
/// modes are normalised to 0644/0755. Only regular files and directories are packed.
pub fn pack_tar_gz(source_dir: &Path) -> Result<Vec<u8>, StoreError> {
    let mut entries = collect_entries(source_dir, source_dir)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut ar = tar::Builder::new(encoder);
    ar.follow_symlinks(false);

    for (rel_path, full_path) in &entries {
        let ft = full_path.symlink_metadata()?.file_type();
        if ft.is_file() {
            let data = fs::read(full_path)?;
            let mut header = make_header(tar::EntryType::Regular, 0o644);
            header.set_size(data.len() as u64);
            header.set_cksum();
            ar.append_data(&mut header, rel_path, data.as_slice())?;
        } else if ft.is_dir() {
            let mut header = make_header(tar::EntryType::Directory, 0o755);
            header.set_size(0);
            header.set_cksum();
            ar.append_data(&mut header, format!("{rel_path}/"), io::empty())?;
        } else {
            warn!("skipping unsupported file type: {rel_path}");
        }
    }

    let encoder = ar.into_inner()?;
    Ok(encoder.finish()?)
}

fn make_header(entry_type: tar::EntryType, mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header
}

/// Recursively collect (relative_path, full_path) pairs from a directory tree.
fn collect_entries(root: &Path, current: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut result = Vec::new();
    if !current.exists() {
        return Ok(result);
    }
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let full = entry.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| StoreError::Io(io::Error::other(format!("path strip: {e}"))))?
            .to_string_lossy()
            .replace('\\', "/");

        if full.symlink_metadata()?.is_dir() {
            result.push((rel.clone(), full.clone()));
            result.extend(collect_entries(root, &full)?);
        } else {
            result.push((rel, full));
        }
    }
    Ok(result)
}
