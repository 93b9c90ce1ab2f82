//! Package manifest parsing, descriptor summaries, and shared document types for nfstore.
//!
//! This crate defines the schema layer: the SHIELD package manifest (`manifest.yaml`,
//! either a `manifest:vnsf` or a `manifest:ns` section), the orchestrator descriptor
//! catalogue summary used by both the local validator and the orchestrator adapters,
//! the security policy pushed to orchestrators, and the validation record produced for
//! each onboarding attempt.

pub mod descriptor;
pub mod manifest;
pub mod policy;
pub mod types;
pub mod validation;

pub use descriptor::{summarize_descriptor, DescriptorError, DescriptorSummary};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, ArtifactType, Manifest, ManifestError, NsManifest,
    PackageProperties, SecurityInfo, VnsfManifest, MANIFEST_FILE,
};
pub use policy::SecurityPolicy;
pub use types::{EntityId, EntityKind, MediaRef, RecordId, TenantId};
pub use validation::{ValidationRecord, ValidationResult};
