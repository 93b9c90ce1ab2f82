use crate::types::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Conventional location of the manifest inside an extracted package.
pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("manifest has neither a 'manifest:vnsf' nor a 'manifest:ns' section")]
    MissingSection,
    #[error("manifest declares both 'manifest:vnsf' and 'manifest:ns' sections")]
    AmbiguousSection,
    #[error("manifest field '{0}' must not be empty")]
    EmptyField(String),
    #[error("network service manifest must list at least one constituent vNSF")]
    NoConstituents,
}

/// Package formats the catalogue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    #[serde(rename = "OSM")]
    Osm,
    #[serde(rename = "OSM-R2")]
    OsmR2,
    #[serde(rename = "OSM-R4")]
    OsmR4,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactType::Osm => f.write_str("OSM"),
            ArtifactType::OsmR2 => f.write_str("OSM-R2"),
            ArtifactType::OsmR4 => f.write_str("OSM-R4"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageProperties {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Attestation material bundled with a vNSF.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SecurityInfo {
    pub attestation_filename: String,
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct VnsfManifest {
    pub schema_version: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    /// Inner orchestrator package, relative to the extracted tree.
    pub package: String,
    pub hash: String,
    pub hashing_algorithm: String,
    /// Descriptor file, relative to the extracted tree.
    pub descriptor: String,
    #[serde(default)]
    pub properties: PackageProperties,
    pub security_info: SecurityInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NsManifest {
    pub schema_version: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub package: String,
    pub hash: String,
    pub hashing_algorithm: String,
    pub descriptor: String,
    /// Deployment target, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub properties: PackageProperties,
    /// Previously onboarded vNSFs this service is composed of, in declaration order.
    pub constituent_vnsfs: Vec<EntityId>,
}

/// On-disk shape: one mapping with exactly one of the two section keys.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ManifestDocument {
    #[serde(rename = "manifest:vnsf", default, skip_serializing_if = "Option::is_none")]
    vnsf: Option<VnsfManifest>,
    #[serde(rename = "manifest:ns", default, skip_serializing_if = "Option::is_none")]
    ns: Option<NsManifest>,
}

/// A parsed and validated package manifest.
///
/// Construction always goes through [`parse_manifest_str`] or deserialization, both of
/// which reject manifests with missing or empty required fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ManifestDocument", into = "ManifestDocument")]
pub enum Manifest {
    Vnsf(VnsfManifest),
    Ns(NsManifest),
}

impl Manifest {
    pub fn kind(&self) -> EntityKind {
        match self {
            Manifest::Vnsf(_) => EntityKind::Vnsf,
            Manifest::Ns(_) => EntityKind::Ns,
        }
    }

    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Manifest::Vnsf(m) => m.artifact_type,
            Manifest::Ns(m) => m.artifact_type,
        }
    }

    /// Relative path of the inner orchestrator package.
    pub fn package(&self) -> &str {
        match self {
            Manifest::Vnsf(m) => &m.package,
            Manifest::Ns(m) => &m.package,
        }
    }

    /// Relative path of the descriptor.
    pub fn descriptor(&self) -> &str {
        match self {
            Manifest::Vnsf(m) => &m.descriptor,
            Manifest::Ns(m) => &m.descriptor,
        }
    }

    pub fn properties(&self) -> &PackageProperties {
        match self {
            Manifest::Vnsf(m) => &m.properties,
            Manifest::Ns(m) => &m.properties,
        }
    }

    /// Attestation metadata. Only vNSF manifests carry it.
    pub fn security_info(&self) -> Option<&SecurityInfo> {
        match self {
            Manifest::Vnsf(m) => Some(&m.security_info),
            Manifest::Ns(_) => None,
        }
    }

    /// Constituent vNSF ids. Empty for vNSF manifests.
    pub fn constituents(&self) -> &[EntityId] {
        match self {
            Manifest::Vnsf(_) => &[],
            Manifest::Ns(m) => &m.constituent_vnsfs,
        }
    }

    fn validate(&self) -> Result<(), ManifestError> {
        let (section, common) = match self {
            Manifest::Vnsf(m) => (
                "manifest:vnsf",
                [
                    ("schema_version", m.schema_version.as_str()),
                    ("package", m.package.as_str()),
                    ("hash", m.hash.as_str()),
                    ("hashing_algorithm", m.hashing_algorithm.as_str()),
                    ("descriptor", m.descriptor.as_str()),
                ],
            ),
            Manifest::Ns(m) => (
                "manifest:ns",
                [
                    ("schema_version", m.schema_version.as_str()),
                    ("package", m.package.as_str()),
                    ("hash", m.hash.as_str()),
                    ("hashing_algorithm", m.hashing_algorithm.as_str()),
                    ("descriptor", m.descriptor.as_str()),
                ],
            ),
        };
        for (field, value) in common {
            require_non_empty(section, field, value)?;
        }

        match self {
            Manifest::Vnsf(m) => {
                require_non_empty(
                    section,
                    "security_info.attestation_filename",
                    &m.security_info.attestation_filename,
                )?;
                require_non_empty(section, "security_info.hash", &m.security_info.hash)?;
            }
            Manifest::Ns(m) => {
                if m.constituent_vnsfs.is_empty() {
                    return Err(ManifestError::NoConstituents);
                }
                for id in &m.constituent_vnsfs {
                    require_non_empty(section, "constituent_vnsfs[]", id)?;
                }
            }
        }
        Ok(())
    }
}

fn require_non_empty(section: &str, field: &str, value: &str) -> Result<(), ManifestError> {
    if value.trim().is_empty() {
        return Err(ManifestError::EmptyField(format!("{section}.{field}")));
    }
    Ok(())
}

impl TryFrom<ManifestDocument> for Manifest {
    type Error = ManifestError;

    fn try_from(doc: ManifestDocument) -> Result<Self, Self::Error> {
        let manifest = match (doc.vnsf, doc.ns) {
            (Some(vnsf), None) => Manifest::Vnsf(vnsf),
            (None, Some(ns)) => Manifest::Ns(ns),
            (Some(_), Some(_)) => return Err(ManifestError::AmbiguousSection),
            (None, None) => return Err(ManifestError::MissingSection),
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

impl From<Manifest> for ManifestDocument {
    fn from(manifest: Manifest) -> Self {
        match manifest {
            Manifest::Vnsf(vnsf) => ManifestDocument {
                vnsf: Some(vnsf),
                ns: None,
            },
            Manifest::Ns(ns) => ManifestDocument {
                vnsf: None,
                ns: Some(ns),
            },
        }
    }
}

pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    let doc: ManifestDocument = serde_yaml::from_str(input)?;
    Manifest::try_from(doc)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
