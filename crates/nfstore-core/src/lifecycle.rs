use crate::CoreError;
use nfstore_store::EntityState;

pub fn validate_transition(from: EntityState, to: EntityState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (EntityState::Submitted, EntityState::Sandboxed)
            | (EntityState::Sandboxed, EntityState::Onboarded)
            | (
                EntityState::Sandboxed | EntityState::Onboarded,
                EntityState::Decommissioned
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Records can only be removed outright while nothing downstream knows about them.
pub fn validate_purge(state: EntityState) -> Result<(), CoreError> {
    if state == EntityState::Submitted {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: state.to_string(),
            to: "purged".to_owned(),
        })
    }
}
