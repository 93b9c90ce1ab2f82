//! Third pipeline stage: locate the descriptor, the inner package, and (for vNSFs) the
//! attestation file inside the extracted tree.

use crate::CoreError;
use nfstore_schema::Manifest;
use nfstore_store::join_within;
use std::path::{Path, PathBuf};

/// Paths of everything downstream stages read from the extracted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorHandle {
    pub descriptor_path: PathBuf,
    /// The inner orchestrator package, as declared by the manifest. Its presence is
    /// checked by the orchestrator adapter, which owns that layout.
    pub package_path: PathBuf,
    pub attestation_path: Option<PathBuf>,
}

impl DescriptorHandle {
    pub fn read_descriptor(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.descriptor_path)
    }
}

/// A regular file at `relative` whose real location is inside `root`.
fn existing_file(root: &Path, relative: &str, what: &str) -> Result<PathBuf, CoreError> {
    let contained = join_within(root, relative).filter(|path| {
        match (path.canonicalize(), root.canonicalize()) {
            (Ok(real), Ok(real_root)) => real.starts_with(real_root) && real.is_file(),
            _ => false,
        }
    });
    contained.ok_or_else(|| {
        CoreError::MissingDescriptor(format!("{what} '{relative}' not found in package"))
    })
}

pub fn resolve(root: &Path, manifest: &Manifest) -> Result<DescriptorHandle, CoreError> {
    let descriptor_path = existing_file(root, manifest.descriptor(), "descriptor")?;
    let attestation_path = match manifest.security_info() {
        Some(security) => Some(existing_file(
            root,
            &security.attestation_filename,
            "attestation file",
        )?),
        None => None,
    };
    let package_path = join_within(root, manifest.package()).ok_or_else(|| {
        CoreError::WrongPackageFormat(format!(
            "package path '{}' leaves the archive",
            manifest.package()
        ))
    })?;

    Ok(DescriptorHandle {
        descriptor_path,
        package_path,
        attestation_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstore_schema::parse_manifest_str;
    use std::fs;

    fn vnsf_manifest(descriptor: &str, attestation: &str) -> Manifest {
        parse_manifest_str(&format!(
            r#"
manifest:vnsf:
  schema_version: "1.0"
  type: OSM
  package: cirros_vnf.tar.gz
  hash: abc
  hashing_algorithm: SHA256
  descriptor: {descriptor}
  security_info:
    attestation_filename: {attestation}
    hash: def
"#
        ))
        .unwrap()
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("cirros_vnf")).unwrap();
        fs::write(dir.path().join("cirros_vnf/cirros_vnfd.yaml"), "vnfd").unwrap();
        fs::write(dir.path().join("attestation.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn resolves_all_paths() {
        let dir = tree();
        let manifest = vnsf_manifest("cirros_vnf/cirros_vnfd.yaml", "attestation.json");
        let handle = resolve(dir.path(), &manifest).unwrap();
        assert_eq!(handle.read_descriptor().unwrap(), b"vnfd");
        assert_eq!(handle.package_path, dir.path().join("cirros_vnf.tar.gz"));
        assert_eq!(
            handle.attestation_path,
            Some(dir.path().join("attestation.json"))
        );
    }

    #[test]
    fn missing_descriptor() {
        let dir = tree();
        let manifest = vnsf_manifest("cirros_vnf/other.yaml", "attestation.json");
        assert!(matches!(
            resolve(dir.path(), &manifest),
            Err(CoreError::MissingDescriptor(_))
        ));
    }

    #[test]
    fn directory_is_not_a_descriptor() {
        let dir = tree();
        let manifest = vnsf_manifest("cirros_vnf", "attestation.json");
        assert!(matches!(
            resolve(dir.path(), &manifest),
            Err(CoreError::MissingDescriptor(_))
        ));
    }

    #[test]
    fn missing_attestation() {
        let dir = tree();
        let manifest = vnsf_manifest("cirros_vnf/cirros_vnfd.yaml", "proof.json");
        let err = resolve(dir.path(), &manifest).unwrap_err();
        assert!(err.to_string().contains("proof.json"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn attestation_linked_outside_the_tree_is_missing() {
        let dir = tree();
        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        fs::write(&secret, "host data").unwrap();
        fs::remove_file(dir.path().join("attestation.json")).unwrap();
        std::os::unix::fs::symlink(&secret, dir.path().join("attestation.json")).unwrap();

        let manifest = vnsf_manifest("cirros_vnf/cirros_vnfd.yaml", "attestation.json");
        assert!(matches!(
            resolve(dir.path(), &manifest),
            Err(CoreError::MissingDescriptor(msg)) if msg.contains("attestation")
        ));
    }

    #[test]
    fn escaping_descriptor_path_is_missing() {
        let dir = tree();
        let manifest = vnsf_manifest("../cirros_vnfd.yaml", "attestation.json");
        assert!(matches!(
            resolve(dir.path(), &manifest),
            Err(CoreError::MissingDescriptor(_))
        ));
    }
}
