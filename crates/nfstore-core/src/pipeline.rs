//! Onboarding attempts: one uploaded package in, one sandboxed catalogue entity (or one
//! classified failure) out.
//!
//! Stages run strictly in order and the cheapest, most local checks come first:
//!
//! ```text
//! Start -> ArchiveValidated -> ManifestLoaded -> DescriptorResolved
//!       -> [DependenciesResolved] -> OrchestratorAccepted -> EntityAssembled -> Persisted
//! ```
//!
//! Whatever stage an attempt stops at, its staged upload and extracted tree are removed
//! before [`Engine::onboard`] returns.

use crate::dependencies::{self, ResolvedConstituent};
use crate::engine::{Engine, StoredEntity};
use crate::error::OnboardingFailure;
use crate::inspector::{self, ExtractedTree, UploadedPackage};
use crate::loader::{self, LoadedManifest};
use crate::resolver;
use crate::validator::ValidationInput;
use crate::CoreError;
use nfstore_schema::{EntityId, EntityKind, RecordId, TenantId};
use nfstore_store::{Collection, EntityState, OnboardedEntity, StoreError};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::Read;
use tracing::{debug, info, warn};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ArchiveValidated,
    ManifestLoaded,
    DescriptorResolved,
    DependenciesResolved,
    OrchestratorAccepted,
    EntityAssembled,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One onboarding request as received from the front end.
pub struct OnboardRequest<R> {
    pub kind: EntityKind,
    pub tenant: TenantId,
    pub upload: Option<UploadedPackage<R>>,
    /// Extra form fields merged into the entity. Reserved keys are ignored.
    pub fields: Map<String, Value>,
}

impl<R: Read> OnboardRequest<R> {
    pub fn new(kind: EntityKind, tenant: TenantId, upload: UploadedPackage<R>) -> Self {
        Self {
            kind,
            tenant,
            upload: Some(upload),
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_owned(), value.into());
        self
    }
}

/// The catalogue document a successful attempt produced, before it is stored.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub collection: Collection,
    pub id: EntityId,
    pub entity: OnboardedEntity,
}

impl AssembledDocument {
    fn new(entity: OnboardedEntity) -> Self {
        Self {
            collection: Collection::for_kind(entity.kind),
            id: entity.entity_id.clone(),
            entity,
        }
    }
}

struct Attempt {
    kind: EntityKind,
    stage: Stage,
    validation: Option<RecordId>,
}

impl Attempt {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            stage: Stage::Start,
            validation: None,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!("{} onboarding: {} -> {stage}", self.kind, self.stage);
        self.stage = stage;
    }
}

fn merge_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter(|(key, _)| {
            let reserved = OnboardedEntity::is_reserved(key);
            if reserved {
                debug!("ignoring reserved form field '{key}'");
            }
            !reserved
        })
        .collect()
}

impl Engine {
    /// Run one onboarding attempt.
    ///
    /// On success the entity is in the catalogue in state `sandboxed`. On failure the
    /// returned [`OnboardingFailure`] carries the classified error and, when validation
    /// had already run, the id of the stored validation record.
    pub fn onboard<R: Read>(
        &self,
        request: OnboardRequest<R>,
    ) -> Result<StoredEntity, OnboardingFailure> {
        let OnboardRequest {
            kind,
            tenant,
            upload,
            fields,
        } = request;
        let filename = upload
            .as_ref()
            .map(|u| u.filename.clone())
            .unwrap_or_default();
        info!("onboarding {kind} package '{filename}' for tenant {tenant}");

        let mut attempt = Attempt::new(kind);
        let result = inspector::extract(upload, self.temp_root.as_deref()).and_then(|tree| {
            attempt.advance(Stage::ArchiveValidated);
            let result = self.process(&mut attempt, &tree, &tenant, fields);
            tree.close();
            result
        });

        match result {
            Ok(stored) => {
                info!("{kind} '{filename}' onboarded as {}", stored.id());
                Ok(stored)
            }
            Err(error) => {
                warn!(
                    "{kind} '{filename}' rejected after {}: {error}",
                    attempt.stage
                );
                Err(OnboardingFailure {
                    error,
                    validation: attempt.validation,
                })
            }
        }
    }

    fn process(
        &self,
        attempt: &mut Attempt,
        tree: &ExtractedTree,
        tenant: &TenantId,
        fields: Map<String, Value>,
    ) -> Result<StoredEntity, CoreError> {
        let kind = attempt.kind;
        let LoadedManifest { manifest, raw } = loader::load(tree.root())?;
        if manifest.kind() != kind {
            return Err(CoreError::ManifestFormatInvalid(format!(
                "expected a '{}' section, found '{}'",
                kind.manifest_section(),
                manifest.kind().manifest_section()
            )));
        }
        let target = self.adapter.kind();
        if !target.accepts(manifest.artifact_type()) {
            return Err(CoreError::ManifestFormatInvalid(format!(
                "'{}' packages cannot be onboarded on {target}",
                manifest.artifact_type()
            )));
        }
        attempt.advance(Stage::ManifestLoaded);

        let handle = resolver::resolve(tree.root(), &manifest)?;
        attempt.advance(Stage::DescriptorResolved);

        // Constituent descriptors go to their own directory, never into the uploaded
        // tree; it is removed when `_staging` drops at the end of the attempt.
        let (constituents, _staging) = if kind == EntityKind::Ns {
            let staging = inspector::scratch_dir("nfstore-deps-", self.temp_root.as_deref())?;
            let resolved =
                dependencies::resolve(&self.store, manifest.constituents(), staging.path())?;
            attempt.advance(Stage::DependenciesResolved);
            (resolved, Some(staging))
        } else {
            (Vec::new(), None)
        };

        if let Some(validator) = &self.validator {
            let descriptor = handle.read_descriptor()?;
            let record = validator.validate(&ValidationInput {
                kind,
                descriptor: &descriptor,
                declared: manifest.constituents(),
                constituents: &constituents,
            });
            let stored = self
                .store
                .create(Collection::Validations, serde_json::to_value(&record)?)?;
            debug!(
                "validation record {}: {} error(s), {} warning(s)",
                stored.id, record.result.error_count, record.result.warning_count
            );
            attempt.validation = Some(stored.id);
            if record.has_errors() {
                return Err(CoreError::ValidationFailed {
                    errors: record.result.error_count,
                });
            }
        }

        let accepted = self
            .adapter
            .onboard(tenant, &handle.package_path, manifest.descriptor(), kind)?;
        attempt.advance(Stage::OrchestratorAccepted);

        let manifest_file = self.media.put(&raw)?;
        let attestation_file = match &handle.attestation_path {
            Some(path) => Some(self.media.put(&fs::read(path)?)?),
            None => None,
        };
        let assembled = AssembledDocument::new(OnboardedEntity {
            kind,
            entity_id: accepted.assigned_id,
            name: accepted.name,
            state: EntityState::Sandboxed,
            tenant_id: tenant.clone(),
            manifest,
            descriptor: accepted.descriptor,
            manifest_file,
            attestation_file,
            constituent_vnsfs: constituents
                .iter()
                .map(ResolvedConstituent::to_ref)
                .collect(),
            validation: attempt.validation.clone(),
            extra: merge_fields(fields),
        });
        attempt.advance(Stage::EntityAssembled);

        dependencies::verify_pinned(&self.store, &assembled.entity.constituent_vnsfs)?;
        let stored = self.persist(assembled)?;
        attempt.advance(Stage::Persisted);
        Ok(stored)
    }

    fn persist(&self, assembled: AssembledDocument) -> Result<StoredEntity, CoreError> {
        let AssembledDocument {
            collection,
            id,
            entity,
        } = assembled;
        let document = entity.to_document()?;
        match self.store.create_with_id(collection, &id, document) {
            Ok(stored) => StoredEntity::from_stored(stored),
            Err(StoreError::AlreadyExists { .. }) => Err(CoreError::DuplicateEntity {
                kind: entity.kind,
                id: id.into_inner(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
