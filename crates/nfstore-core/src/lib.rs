//! Onboarding pipeline and catalogue lifecycle for nfstore.
//!
//! This crate ties together manifest parsing, the catalogue store, and the
//! orchestrator adapters into the `Engine`: the API for onboarding vNSF and NS
//! packages, and for moving onboarded entities through their lifecycle. The pipeline
//! stages (archive inspection, manifest loading, descriptor and dependency
//! resolution, descriptor validation) live in their own modules; every failure is
//! classified once into an [`ErrorKind`] and mapped onto a [`StatusClass`].

pub mod dependencies;
pub mod engine;
pub mod error;
pub mod inspector;
pub mod lifecycle;
pub mod loader;
pub mod pipeline;
pub mod resolver;
pub mod settings;
pub mod validator;

pub use dependencies::ResolvedConstituent;
pub use engine::{Engine, StoredEntity};
pub use error::{ErrorKind, OnboardingFailure, StatusClass};
pub use inspector::{ExtractedTree, UploadedPackage};
pub use lifecycle::{validate_purge, validate_transition};
pub use pipeline::{AssembledDocument, OnboardRequest, Stage};
pub use resolver::DescriptorHandle;
pub use settings::Settings;
pub use validator::{DescriptorValidator, StructuralValidator, ValidationInput};

use nfstore_schema::{EntityId, EntityKind};
use nfstore_store::{Collection, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no package uploaded: {0}")]
    PackageMissing(String),
    #[error("wrong package format: {0}")]
    WrongPackageFormat(String),
    #[error("package not compliant: {0}")]
    PackageNotCompliant(String),
    #[error("invalid manifest: {0}")]
    ManifestFormatInvalid(String),
    #[error("missing descriptor: {0}")]
    MissingDescriptor(String),
    #[error("missing dependency: vNSF '{0}' is not onboarded")]
    MissingDependency(EntityId),
    #[error("descriptor validation failed with {errors} error(s)")]
    ValidationFailed { errors: u32 },
    #[error("{0}")]
    Orchestrator(#[from] nfstore_vnsfo::VnsfoError),
    #[error("concurrency token for {collection}/{id} is stale")]
    ConcurrencyConflict { collection: Collection, id: String },
    #[error("{kind} '{id}' not found")]
    EntityNotFound { kind: EntityKind, id: String },
    #[error("{kind} '{id}' is already in the catalogue")]
    DuplicateEntity { kind: EntityKind, id: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("settings error: {0}")]
    Settings(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { collection, id } => {
                CoreError::ConcurrencyConflict { collection, id }
            }
            other => CoreError::Store(other),
        }
    }
}
