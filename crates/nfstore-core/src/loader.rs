//! Second pipeline stage: find and parse the package manifest.

use crate::CoreError;
use nfstore_schema::{parse_manifest_str, Manifest, MANIFEST_FILE};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A parsed manifest together with its raw bytes, which are kept as the entity's
/// manifest binary.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub raw: Vec<u8>,
}

fn list_contents(root: &Path) -> String {
    let mut names: Vec<String> = fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    if names.is_empty() {
        "nothing".to_owned()
    } else {
        names.join(", ")
    }
}

/// Load `manifest.yaml` from the root of an extracted package.
pub fn load(root: &Path) -> Result<LoadedManifest, CoreError> {
    let path = root.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(CoreError::PackageNotCompliant(format!(
            "no {MANIFEST_FILE} at the package root; package contains: {}",
            list_contents(root)
        )));
    }
    let raw = fs::read(&path)?;
    let text = String::from_utf8(raw)
        .map_err(|_| CoreError::ManifestFormatInvalid(format!("{MANIFEST_FILE} is not UTF-8")))?;
    let manifest =
        parse_manifest_str(&text).map_err(|e| CoreError::ManifestFormatInvalid(e.to_string()))?;
    debug!(
        "loaded {} manifest for package '{}'",
        manifest.kind(),
        manifest.package()
    );
    Ok(LoadedManifest {
        manifest,
        raw: text.into_bytes(),
    })
}
