//! NS constituent resolution against the catalogue.

use crate::CoreError;
use nfstore_schema::EntityId;
use nfstore_store::{
    CatalogueStore, Collection, ConstituentRef, OnboardedEntity, StoreError, StoredDocument,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A constituent vNSF as found in the catalogue when the NS was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConstituent {
    pub id: EntityId,
    pub descriptor: String,
    /// Concurrency token of the vNSF record at resolution time.
    pub etag: String,
    /// Copy of the descriptor in the attempt's staging directory.
    pub descriptor_path: PathBuf,
}

impl ResolvedConstituent {
    pub fn to_ref(&self) -> ConstituentRef {
        ConstituentRef {
            vnsf_id: self.id.clone(),
            etag: self.etag.clone(),
        }
    }
}

/// Look up an active vNSF. Anything that does not resolve to one is a missing dependency.
fn lookup(
    store: &CatalogueStore,
    id: &EntityId,
) -> Result<(StoredDocument, OnboardedEntity), CoreError> {
    let stored = match store.get(Collection::Vnsfs, id) {
        Ok(stored) => stored,
        Err(StoreError::DocumentNotFound { .. } | StoreError::InvalidId(_)) => {
            return Err(CoreError::MissingDependency(id.clone()));
        }
        Err(e) => return Err(e.into()),
    };
    let entity = OnboardedEntity::from_stored(&stored)?;
    if !entity.is_active() {
        debug!("constituent {id} is {}", entity.state);
        return Err(CoreError::MissingDependency(id.clone()));
    }
    Ok((stored, entity))
}

/// Resolve every constituent in declaration order, stopping at the first one that is
/// missing. Each descriptor is written to `<staging_dir>/<id>.yaml`; `staging_dir` must
/// already exist.
pub fn resolve(
    store: &CatalogueStore,
    ids: &[EntityId],
    staging_dir: &Path,
) -> Result<Vec<ResolvedConstituent>, CoreError> {
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        let (stored, entity) = lookup(store, id)?;

        let descriptor_path = staging_dir.join(format!("{id}.yaml"));
        fs::write(&descriptor_path, &entity.descriptor)?;
        debug!("resolved constituent {id} at revision {}", stored.revision);

        resolved.push(ResolvedConstituent {
            id: id.clone(),
            descriptor: entity.descriptor,
            etag: stored.etag,
            descriptor_path,
        });
    }
    Ok(resolved)
}

/// Re-check pinned constituents right before the NS is persisted.
///
/// A constituent that vanished or was decommissioned since resolution fails the NS.
/// Other edits to the vNSF record are accepted.
pub fn verify_pinned(store: &CatalogueStore, pinned: &[ConstituentRef]) -> Result<(), CoreError> {
    for constituent in pinned {
        let (current, _) = lookup(store, &constituent.vnsf_id)?;
        if current.etag != constituent.etag {
            debug!(
                "constituent {} changed since resolution but is still active",
                constituent.vnsf_id
            );
        }
    }
    Ok(())
}
