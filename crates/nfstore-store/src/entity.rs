use crate::catalogue::StoredDocument;
use crate::StoreError;
use nfstore_schema::{EntityId, EntityKind, Manifest, MediaRef, RecordId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state shared by vNSF and NS entities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    Submitted,
    Sandboxed,
    Onboarded,
    Decommissioned,
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityState::Submitted => write!(f, "submitted"),
            EntityState::Sandboxed => write!(f, "sandboxed"),
            EntityState::Onboarded => write!(f, "onboarded"),
            EntityState::Decommissioned => write!(f, "decommissioned"),
        }
    }
}

/// An NS constituent, pinned to the concurrency token it had when the NS was resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstituentRef {
    pub vnsf_id: EntityId,
    pub etag: String,
}

/// Catalogue document of an onboarded vNSF or NS.
///
/// Free-form fields supplied with the upload are kept in `extra` and flattened into
/// the stored document next to the computed fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardedEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub state: EntityState,
    pub tenant_id: TenantId,
    pub manifest: Manifest,
    pub descriptor: String,
    pub manifest_file: MediaRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_file: Option<MediaRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constituent_vnsfs: Vec<ConstituentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<RecordId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OnboardedEntity {
    /// Keys computed by the pipeline. Caller-supplied fields with these names are dropped.
    pub const RESERVED_FIELDS: &'static [&'static str] = &[
        "type",
        "entity_id",
        "name",
        "state",
        "tenant_id",
        "manifest",
        "descriptor",
        "manifest_file",
        "attestation_file",
        "constituent_vnsfs",
        "validation",
    ];

    pub fn is_reserved(field: &str) -> bool {
        Self::RESERVED_FIELDS.contains(&field)
    }

    pub fn to_document(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_stored(stored: &StoredDocument) -> Result<Self, StoreError> {
        stored.decode()
    }

    /// The entity as shown to other platform components: without the stored manifest
    /// binary reference and without the lifecycle state.
    pub fn public_view(&self) -> Result<Value, StoreError> {
        let mut value = self.to_document()?;
        if let Some(map) = value.as_object_mut() {
            map.remove("manifest_file");
            map.remove("state");
        }
        Ok(value)
    }

    /// Whether the entity can still back an NS constituent reference.
    pub fn is_active(&self) -> bool {
        self.state != EntityState::Decommissioned
    }
}
