use crate::{OrchestratorKind, VnsfoError};
use nfstore_schema::{summarize_descriptor, DescriptorSummary, EntityKind};
use nfstore_store::{extract_tar_gz, is_tar_gz_file, join_within, tar_gz_basename};
use std::fs;
use std::path::{Path, PathBuf};

/// The orchestrator's reading of a package.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPackage {
    pub summary: DescriptorSummary,
    pub canonical_descriptor: String,
}

/// Orchestrator-specific package format check.
///
/// Implementations work on their own private extraction of the package and must remove
/// it before returning, whatever the outcome.
pub trait PackageValidator: Send + Sync {
    fn validate(
        &self,
        package: &Path,
        descriptor_rel: &str,
        kind: EntityKind,
    ) -> Result<ValidatedPackage, VnsfoError>;
}

pub fn validator_for(
    kind: OrchestratorKind,
    temp_root: Option<&Path>,
) -> Box<dyn PackageValidator> {
    match kind {
        OrchestratorKind::Osm => Box::new(OsmPackageValidator::new(temp_root)),
    }
}

/// OSM package layout:
///
/// ```text
/// <name>.tar.gz
/// └── <name>/
///     └── <descriptor>.yaml   (referenced by the manifest, relative to the archive root)
/// ```
#[derive(Debug, Clone, Default)]
pub struct OsmPackageValidator {
    temp_root: Option<PathBuf>,
}

impl OsmPackageValidator {
    pub fn new(temp_root: Option<&Path>) -> Self {
        Self {
            temp_root: temp_root.map(Path::to_path_buf),
        }
    }

    fn staging_dir(&self) -> Result<tempfile::TempDir, VnsfoError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nfstore-osm-");
        Ok(match &self.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        })
    }

    fn inspect(
        dir: &Path,
        package: &Path,
        descriptor_rel: &str,
        kind: EntityKind,
    ) -> Result<ValidatedPackage, VnsfoError> {
        extract_tar_gz(package, dir)
            .map_err(|e| VnsfoError::WrongPackageFormat(e.to_string()))?;
        tracing::debug!("OSM package extracted to {}", dir.display());

        let basename = tar_gz_basename(package).ok_or_else(|| {
            VnsfoError::WrongPackageFormat(format!(
                "package file '{}' is not named <name>.tar.gz",
                package.display()
            ))
        })?;
        if !dir.join(&basename).is_dir() {
            return Err(VnsfoError::MissingDescriptor(format!(
                "package folder '{basename}' not found"
            )));
        }

        let descriptor_path = join_within(dir, descriptor_rel)
            .filter(|p| p.is_file())
            .ok_or_else(|| VnsfoError::MissingDescriptor(descriptor_rel.to_owned()))?;

        let content = fs::read_to_string(&descriptor_path).map_err(|e| {
            VnsfoError::WrongPackageFormat(format!("cannot read descriptor '{descriptor_rel}': {e}"))
        })?;
        let summary = summarize_descriptor(&content, kind).map_err(|e| {
            VnsfoError::WrongPackageFormat(format!("descriptor '{descriptor_rel}': {e}"))
        })?;
        let canonical_descriptor = summary
            .canonical()
            .map_err(|e| VnsfoError::WrongPackageFormat(e.to_string()))?;

        Ok(ValidatedPackage {
            summary,
            canonical_descriptor,
        })
    }
}

impl PackageValidator for OsmPackageValidator {
    fn validate(
        &self,
        package: &Path,
        descriptor_rel: &str,
        kind: EntityKind,
    ) -> Result<ValidatedPackage, VnsfoError> {
        if !is_tar_gz_file(package) {
            return Err(VnsfoError::WrongPackageFormat(format!(
                "'{}' is not a gzip-compressed tar archive",
                package.display()
            )));
        }

        let staging = self.staging_dir()?;
        let result = Self::inspect(staging.path(), package, descriptor_rel, kind);
        let path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!("failed to remove OSM staging dir {}: {e}", path.display());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstore_store::pack_tar_gz;

    const VNFD: &str = "vnfd:vnfd-catalog:\n  vnfd:\n  - id: cirros_vnfd\n    name: cirros_vnf\n";

    /// Write `<work>/<name>.tar.gz` containing the given files.
    fn package(work: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let src = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = src.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let out = work.join(format!("{name}.tar.gz"));
        fs::write(&out, pack_tar_gz(src.path()).unwrap()).unwrap();
        out
    }

    fn staging_is_empty(root: &Path) -> bool {
        fs::read_dir(root).unwrap().next().is_none()
    }

    #[test]
    fn valid_package_yields_descriptor_summary() {
        let work = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let pkg = package(work.path(), "cirros_vnf", &[("cirros_vnf/cirros_vnfd.yaml", VNFD)]);

        let validated = OsmPackageValidator::new(Some(staging.path()))
            .validate(&pkg, "cirros_vnf/cirros_vnfd.yaml", EntityKind::Vnsf)
            .unwrap();
        assert_eq!(validated.summary.id, "cirros_vnfd");
        assert!(validated.canonical_descriptor.contains("cirros_vnfd"));
        assert!(staging_is_empty(staging.path()));
    }

    #[test]
    fn non_archive_is_wrong_format() {
        let work = tempfile::tempdir().unwrap();
        let pkg = work.path().join("cirros_vnf.tar.gz");
        fs::write(&pkg, b"nope").unwrap();
        let err = OsmPackageValidator::default()
            .validate(&pkg, "cirros_vnf/cirros_vnfd.yaml", EntityKind::Vnsf)
            .unwrap_err();
        assert!(matches!(err, VnsfoError::WrongPackageFormat(_)));
    }

    #[test]
    fn missing_package_folder_is_missing_descriptor() {
        let work = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let pkg = package(work.path(), "cirros_vnf", &[("other/cirros_vnfd.yaml", VNFD)]);
        let err = OsmPackageValidator::new(Some(staging.path()))
            .validate(&pkg, "other/cirros_vnfd.yaml", EntityKind::Vnsf)
            .unwrap_err();
        assert!(matches!(err, VnsfoError::MissingDescriptor(_)));
        assert!(staging_is_empty(staging.path()));
    }

    #[test]
    fn missing_descriptor_file_is_missing_descriptor() {
        let work = tempfile::tempdir().unwrap();
        let pkg = package(work.path(), "cirros_vnf", &[("cirros_vnf/readme.txt", "hi")]);
        let err = OsmPackageValidator::default()
            .validate(&pkg, "cirros_vnf/cirros_vnfd.yaml", EntityKind::Vnsf)
            .unwrap_err();
        assert!(matches!(err, VnsfoError::MissingDescriptor(_)));
    }

    #[test]
    fn escaping_descriptor_path_is_missing_descriptor() {
        let work = tempfile::tempdir().unwrap();
        let pkg = package(work.path(), "cirros_vnf", &[("cirros_vnf/cirros_vnfd.yaml", VNFD)]);
        let err = OsmPackageValidator::default()
            .validate(&pkg, "../cirros_vnf.tar.gz", EntityKind::Vnsf)
            .unwrap_err();
        assert!(matches!(err, VnsfoError::MissingDescriptor(_)));
    }

    #[test]
    fn unreadable_descriptor_is_wrong_format() {
        let work = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let pkg = package(
            work.path(),
            "cirros_vnf",
            &[("cirros_vnf/cirros_vnfd.yaml", "just: [unterminated")],
        );
        let err = OsmPackageValidator::new(Some(staging.path()))
            .validate(&pkg, "cirros_vnf/cirros_vnfd.yaml", EntityKind::Vnsf)
            .unwrap_err();
        assert!(matches!(err, VnsfoError::WrongPackageFormat(_)));
        assert!(staging_is_empty(staging.path()));
    }

    #[test]
    fn vnf_descriptor_is_not_a_service() {
        let work = tempfile::tempdir().unwrap();
        let pkg = package(work.path(), "cirros_vnf", &[("cirros_vnf/cirros_vnfd.yaml", VNFD)]);
        let err = OsmPackageValidator::default()
            .validate(&pkg, "cirros_vnf/cirros_vnfd.yaml", EntityKind::Ns)
            .unwrap_err();
        assert!(matches!(err, VnsfoError::WrongPackageFormat(_)));
    }
}
