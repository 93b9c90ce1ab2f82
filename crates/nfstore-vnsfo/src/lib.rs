//! Orchestrator integration for nfstore.
//!
//! The pipeline talks to an orchestrator only through the [`OrchestratorAdapter`]
//! trait. Adapters own their own view of what a valid package is (a
//! [`PackageValidator`] picked by [`OrchestratorKind`]), because the orchestrator's
//! package layout is a different contract from the store's manifest. The only adapter
//! today is [`OsmAdapter`], which speaks the OSM package API over HTTP.

pub mod config;
pub mod osm;
pub mod package;

pub use config::{OrchestratorConfig, OrchestratorKind};
pub use osm::OsmAdapter;
pub use package::{validator_for, OsmPackageValidator, PackageValidator, ValidatedPackage};

use nfstore_schema::{EntityId, EntityKind, SecurityPolicy, TenantId};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VnsfoError {
    #[error("package does not match the orchestrator format: {0}")]
    WrongPackageFormat(String),
    #[error("orchestrator descriptor missing: {0}")]
    MissingDescriptor(String),
    #[error("orchestrator rejected request to {url}: HTTP {status} {reason}")]
    Rejected {
        url: String,
        status: u16,
        reason: String,
    },
    #[error("orchestrator unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("unsupported orchestrator type: {0}")]
    UnsupportedOrchestrator(String),
    #[error("orchestrator config error: {0}")]
    Config(String),
    #[error("orchestrator adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the orchestrator registered for an onboarded package.
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardedPackage {
    pub assigned_id: EntityId,
    pub name: Option<String>,
    /// Canonical rendering of the orchestrator-side descriptor.
    pub descriptor: String,
    /// Constituent references found in a service descriptor. Empty for vNSFs.
    pub constituent_refs: Vec<String>,
}

/// A remote orchestration system packages are registered with.
///
/// Every call is attempted at most once; retry policy belongs to the caller.
pub trait OrchestratorAdapter: Send + Sync {
    fn kind(&self) -> OrchestratorKind;

    /// Validate the inner package against the orchestrator's layout and submit it.
    fn onboard(
        &self,
        tenant: &TenantId,
        package: &Path,
        descriptor_rel: &str,
        kind: EntityKind,
    ) -> Result<OnboardedPackage, VnsfoError>;

    fn decommission(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<(), VnsfoError>;

    fn apply_policy(&self, tenant: &TenantId, policy: &SecurityPolicy) -> Result<(), VnsfoError>;
}

/// Build the adapter for the configured orchestrator kind.
///
/// `temp_root` is where adapters stage their package re-extraction; `None` means the
/// OS temp directory.
pub fn select_adapter(
    config: &OrchestratorConfig,
    temp_root: Option<&Path>,
) -> Box<dyn OrchestratorAdapter> {
    match config.kind {
        OrchestratorKind::Osm => Box::new(OsmAdapter::new(config.clone(), temp_root)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_selects_osm() {
        let config = OrchestratorConfig::new("http://127.0.0.1:1");
        let adapter = select_adapter(&config, None);
        assert_eq!(adapter.kind(), OrchestratorKind::Osm);
    }

    #[test]
    fn error_display_carries_diagnostics() {
        let e = VnsfoError::Rejected {
            url: "http://osm/package/onboard".to_owned(),
            status: 409,
            reason: "Conflict".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("package/onboard"));

        let e = VnsfoError::Unreachable {
            url: "http://osm".to_owned(),
            reason: "connection refused".to_owned(),
        };
        assert!(e.to_string().contains("connection refused"));
    }
}
