use crate::lifecycle::{validate_purge, validate_transition};
use crate::settings::Settings;
use crate::validator::{DescriptorValidator, StructuralValidator};
use crate::CoreError;
use nfstore_schema::{EntityId, EntityKind, SecurityPolicy, TenantId, ValidationRecord};
use nfstore_store::{
    CatalogueStore, Collection, EntityState, MediaStore, OnboardedEntity, StoreError,
    StoredDocument,
};
use nfstore_vnsfo::{select_adapter, OrchestratorAdapter};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Entry point for onboarding packages and managing the catalogue entities they become.
///
/// An engine is shareable across threads; each onboarding attempt works in its own
/// uniquely named temp resources, and catalogue mutations are guarded by the
/// concurrency token of the record being changed.
pub struct Engine {
    pub(crate) store: CatalogueStore,
    pub(crate) media: MediaStore,
    pub(crate) adapter: Box<dyn OrchestratorAdapter>,
    pub(crate) validator: Option<Box<dyn DescriptorValidator>>,
    pub(crate) temp_root: Option<PathBuf>,
    default_tenant: TenantId,
}

/// A catalogue entity together with its record metadata.
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity: OnboardedEntity,
    /// Concurrency token required to mutate the entity.
    pub etag: String,
    pub revision: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl StoredEntity {
    pub(crate) fn from_stored(stored: StoredDocument) -> Result<Self, CoreError> {
        let entity = OnboardedEntity::from_stored(&stored)?;
        Ok(Self {
            entity,
            etag: stored.etag,
            revision: stored.revision,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    pub fn id(&self) -> &EntityId {
        &self.entity.entity_id
    }

    pub fn state(&self) -> EntityState {
        self.entity.state
    }
}

impl Engine {
    /// Open the catalogue and connect the adapter for the configured orchestrator.
    pub fn new(settings: &Settings) -> Result<Self, CoreError> {
        let store = CatalogueStore::open(settings.store_root.clone())?;
        if let Some(temp_root) = &settings.temp_root {
            std::fs::create_dir_all(temp_root)?;
        }
        let adapter = select_adapter(&settings.orchestrator, settings.temp_root.as_deref());
        info!(
            "catalogue at {} using {} orchestrator at {}",
            settings.store_root.display(),
            adapter.kind(),
            settings.orchestrator.url
        );
        Ok(Self::with_adapter(
            store,
            adapter,
            settings.temp_root.clone(),
            settings.orchestrator.tenant_id.clone(),
        ))
    }

    pub fn with_adapter(
        store: CatalogueStore,
        adapter: Box<dyn OrchestratorAdapter>,
        temp_root: Option<PathBuf>,
        default_tenant: TenantId,
    ) -> Self {
        let media = MediaStore::new(store.layout().clone());
        Self {
            store,
            media,
            adapter,
            validator: Some(Box::new(StructuralValidator)),
            temp_root,
            default_tenant,
        }
    }

    /// Replace the descriptor validator. `None` skips content validation, in which case
    /// no validation record is produced.
    #[must_use]
    pub fn with_validator(mut self, validator: Option<Box<dyn DescriptorValidator>>) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &CatalogueStore {
        &self.store
    }

    /// Tenant used when a caller does not name one.
    pub fn default_tenant(&self) -> &TenantId {
        &self.default_tenant
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Result<StoredEntity, CoreError> {
        match self.store.get(Collection::for_kind(kind), id) {
            Ok(stored) => StoredEntity::from_stored(stored),
            Err(StoreError::DocumentNotFound { .. } | StoreError::InvalidId(_)) => {
                Err(CoreError::EntityNotFound {
                    kind,
                    id: id.to_owned(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self, kind: EntityKind) -> Result<Vec<StoredEntity>, CoreError> {
        let mut entities = Vec::new();
        for stored in self.store.list(Collection::for_kind(kind))? {
            let id = stored.id.clone();
            match StoredEntity::from_stored(stored) {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!("skipping unreadable {kind} record {id}: {e}"),
            }
        }
        Ok(entities)
    }

    /// Entities whose top-level `field` equals `value`, e.g. a vendor-supplied form field.
    pub fn find_by_field(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredEntity>, CoreError> {
        self.store
            .get_by_field(Collection::for_kind(kind), field, value)?
            .into_iter()
            .map(StoredEntity::from_stored)
            .collect()
    }

    /// The entity as other platform components see it.
    pub fn public_view(&self, kind: EntityKind, id: &str) -> Result<Value, CoreError> {
        Ok(self.get(kind, id)?.entity.public_view()?)
    }

    /// Raw manifest bytes as uploaded, for tamper verification.
    pub fn manifest_file(&self, kind: EntityKind, id: &str) -> Result<Vec<u8>, CoreError> {
        let stored = self.get(kind, id)?;
        Ok(self.media.get(&stored.entity.manifest_file)?)
    }

    pub fn attestation_file(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        let stored = self.get(kind, id)?;
        match &stored.entity.attestation_file {
            Some(media) => Ok(Some(self.media.get(media)?)),
            None => Ok(None),
        }
    }

    pub fn validation_record(&self, id: &str) -> Result<ValidationRecord, CoreError> {
        Ok(self.store.get(Collection::Validations, id)?.decode()?)
    }

    fn current(&self, kind: EntityKind, id: &str, token: &str) -> Result<StoredEntity, CoreError> {
        let current = self.get(kind, id)?;
        if current.etag != token {
            return Err(CoreError::ConcurrencyConflict {
                collection: Collection::for_kind(kind),
                id: id.to_owned(),
            });
        }
        Ok(current)
    }

    fn write_state(
        &self,
        mut current: StoredEntity,
        token: &str,
        to: EntityState,
    ) -> Result<StoredEntity, CoreError> {
        let collection = Collection::for_kind(current.entity.kind);
        current.entity.state = to;
        let document = current.entity.to_document()?;
        let updated = self
            .store
            .update(collection, &current.entity.entity_id, token, document)?;
        StoredEntity::from_stored(updated)
    }

    /// Withdraw an entity from the orchestrator and mark it `decommissioned`.
    ///
    /// The token must match the entity's current one. If the orchestrator does not
    /// confirm the removal, the entity keeps its state.
    pub fn decommission(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &str,
        token: &str,
    ) -> Result<StoredEntity, CoreError> {
        info!("decommissioning {kind} {id}");
        let current = self.current(kind, id, token)?;
        validate_transition(current.state(), EntityState::Decommissioned)?;
        self.adapter
            .decommission(tenant, kind, &current.entity.entity_id)?;
        let updated = self.write_state(current, token, EntityState::Decommissioned)?;
        info!("{kind} {id} decommissioned");
        Ok(updated)
    }

    /// Mark a sandboxed entity as `onboarded`.
    pub fn promote(&self, kind: EntityKind, id: &str, token: &str) -> Result<StoredEntity, CoreError> {
        let current = self.current(kind, id, token)?;
        validate_transition(current.state(), EntityState::Onboarded)?;
        let updated = self.write_state(current, token, EntityState::Onboarded)?;
        info!("{kind} {id} promoted to onboarded");
        Ok(updated)
    }

    /// Hard-delete an entity that never got past `submitted`.
    pub fn purge(&self, kind: EntityKind, id: &str, token: &str) -> Result<(), CoreError> {
        let current = self.current(kind, id, token)?;
        validate_purge(current.state())?;
        self.store.delete(Collection::for_kind(kind), id, token)?;
        info!("{kind} {id} purged");
        Ok(())
    }

    pub fn apply_policy(&self, tenant: &TenantId, policy: &SecurityPolicy) -> Result<(), CoreError> {
        debug!(
            "pushing policy for attack '{}' (severity {}) to the orchestrator",
            policy.attack, policy.severity
        );
        self.adapter.apply_policy(tenant, policy)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstore_schema::{parse_manifest_str, MediaRef};
    use nfstore_vnsfo::{OnboardedPackage, OrchestratorKind, VnsfoError};
    use serde_json::Map;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Adapter that counts calls and answers from a fixed script.
    struct ScriptedAdapter {
        decommissions: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl OrchestratorAdapter for ScriptedAdapter {
        fn kind(&self) -> OrchestratorKind {
            OrchestratorKind::Osm
        }

        fn onboard(
            &self,
            _tenant: &TenantId,
            _package: &Path,
            _descriptor_rel: &str,
            _kind: EntityKind,
        ) -> Result<OnboardedPackage, VnsfoError> {
            Err(VnsfoError::Config("not scripted".to_owned()))
        }

        fn decommission(
            &self,
            _tenant: &TenantId,
            _kind: EntityKind,
            _id: &EntityId,
        ) -> Result<(), VnsfoError> {
            self.decommissions.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(VnsfoError::Unreachable {
                    url: "http://127.0.0.1:1/package/x".to_owned(),
                    reason: "connection refused".to_owned(),
                });
            }
            Ok(())
        }

        fn apply_policy(&self, _tenant: &TenantId, _policy: &SecurityPolicy) -> Result<(), VnsfoError> {
            Ok(())
        }
    }

    fn entity(id: &str, state: EntityState) -> OnboardedEntity {
        let manifest = parse_manifest_str(
            r#"
manifest:vnsf:
  schema_version: "1.0"
  type: OSM
  package: p.tar.gz
  hash: h
  hashing_algorithm: SHA256
  descriptor: p/d.yaml
  security_info:
    attestation_filename: a.json
    hash: h
"#,
        )
        .unwrap();
        OnboardedEntity {
            kind: EntityKind::Vnsf,
            entity_id: EntityId::new(id),
            name: Some("cirros".to_owned()),
            state,
            tenant_id: TenantId::new("t"),
            manifest,
            descriptor: "vnfd".to_owned(),
            manifest_file: MediaRef::new("0".repeat(64)),
            attestation_file: None,
            constituent_vnsfs: Vec::new(),
            validation: None,
            extra: Map::new(),
        }
    }

    fn engine(refuse: bool) -> (tempfile::TempDir, Engine, Arc<AtomicUsize>) {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogueStore::open(dir.path()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = ScriptedAdapter {
            decommissions: Arc::clone(&calls),
            refuse,
        };
        let engine = Engine::with_adapter(store, Box::new(adapter), None, TenantId::new("t"));
        (dir, engine, calls)
    }

    fn insert(engine: &Engine, id: &str, state: EntityState) -> String {
        engine
            .store()
            .create_with_id(Collection::Vnsfs, id, entity(id, state).to_document().unwrap())
            .unwrap()
            .etag
    }

    #[test]
    fn decommission_with_current_token() {
        let (_dir, engine, calls) = engine(false);
        let token = insert(&engine, "v1", EntityState::Sandboxed);
        let updated = engine
            .decommission(&TenantId::new("t"), EntityKind::Vnsf, "v1", &token)
            .unwrap();
        assert_eq!(updated.state(), EntityState::Decommissioned);
        assert_ne!(updated.etag, token);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // the record stays in the catalogue
        assert_eq!(
            engine.get(EntityKind::Vnsf, "v1").unwrap().state(),
            EntityState::Decommissioned
        );
    }

    #[test]
    fn stale_token_never_reaches_the_orchestrator() {
        let (_dir, engine, calls) = engine(false);
        insert(&engine, "v1", EntityState::Onboarded);
        let err = engine
            .decommission(&TenantId::new("t"), EntityKind::Vnsf, "v1", "stale")
            .unwrap_err();
        assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn orchestrator_failure_keeps_state() {
        let (_dir, engine, _calls) = engine(true);
        let token = insert(&engine, "v1", EntityState::Sandboxed);
        let err = engine
            .decommission(&TenantId::new("t"), EntityKind::Vnsf, "v1", &token)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::OrchestratorUnreachable);
        let current = engine.get(EntityKind::Vnsf, "v1").unwrap();
        assert_eq!(current.state(), EntityState::Sandboxed);
        assert_eq!(current.etag, token);
    }

    #[test]
    fn decommissioned_is_terminal() {
        let (_dir, engine, calls) = engine(false);
        let token = insert(&engine, "v1", EntityState::Decommissioned);
        let err = engine
            .decommission(&TenantId::new("t"), EntityKind::Vnsf, "v1", &token)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(engine.promote(EntityKind::Vnsf, "v1", &token).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn promote_then_decommission() {
        let (_dir, engine, _calls) = engine(false);
        let token = insert(&engine, "v1", EntityState::Sandboxed);
        let promoted = engine.promote(EntityKind::Vnsf, "v1", &token).unwrap();
        assert_eq!(promoted.state(), EntityState::Onboarded);
        assert!(engine.promote(EntityKind::Vnsf, "v1", &promoted.etag).is_err());
        engine
            .decommission(&TenantId::new("t"), EntityKind::Vnsf, "v1", &promoted.etag)
            .unwrap();
    }

    #[test]
    fn purge_only_submitted() {
        let (_dir, engine, _calls) = engine(false);
        let sandboxed = insert(&engine, "v1", EntityState::Sandboxed);
        assert!(matches!(
            engine.purge(EntityKind::Vnsf, "v1", &sandboxed),
            Err(CoreError::InvalidTransition { .. })
        ));
        let submitted = insert(&engine, "v2", EntityState::Submitted);
        engine.purge(EntityKind::Vnsf, "v2", &submitted).unwrap();
        assert!(matches!(
            engine.get(EntityKind::Vnsf, "v2"),
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn concurrent_decommissions_have_one_winner() {
        let (_dir, engine, _calls) = engine(false);
        let token = insert(&engine, "v1", EntityState::Sandboxed);
        let engine = Arc::new(engine);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let token = token.clone();
                std::thread::spawn(move || {
                    engine.decommission(&TenantId::new("t"), EntityKind::Vnsf, "v1", &token)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert!(
                matches!(
                    err,
                    CoreError::ConcurrencyConflict { .. } | CoreError::InvalidTransition { .. }
                ),
                "{err}"
            );
        }
    }

    #[test]
    fn lookups() {
        let (_dir, engine, _calls) = engine(false);
        insert(&engine, "v1", EntityState::Sandboxed);
        insert(&engine, "v2", EntityState::Onboarded);
        assert_eq!(engine.list(EntityKind::Vnsf).unwrap().len(), 2);
        assert!(engine.list(EntityKind::Ns).unwrap().is_empty());
        let named = engine
            .find_by_field(EntityKind::Vnsf, "entity_id", "v2")
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].id().as_str(), "v2");
        let view = engine.public_view(EntityKind::Vnsf, "v1").unwrap();
        assert!(view.get("state").is_none());
        assert!(view.get("manifest_file").is_none());
        assert!(matches!(
            engine.get(EntityKind::Ns, "v1"),
            Err(CoreError::EntityNotFound { .. })
        ));
    }
}
