//! Error taxonomy of the onboarding pipeline and its mapping onto response classes.

use crate::CoreError;
use nfstore_schema::RecordId;
use nfstore_vnsfo::VnsfoError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable failure category. Every [`CoreError`] belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    PackageMissing,
    WrongPackageFormat,
    PackageNotCompliant,
    ManifestFormatInvalid,
    MissingDescriptor,
    MissingDependency,
    ValidationFailed,
    OrchestratorRejected,
    OrchestratorUnreachable,
    ConcurrencyConflict,
    EntityNotFound,
    DuplicateEntity,
    InvalidTransition,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Response class an error kind is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusClass {
    PreconditionFailed,
    NotAcceptable,
    Unprocessable,
    BadGateway,
    NotFound,
    InternalError,
}

impl StatusClass {
    pub fn http_status(self) -> u16 {
        match self {
            StatusClass::PreconditionFailed => 412,
            StatusClass::NotAcceptable => 406,
            StatusClass::Unprocessable => 422,
            StatusClass::BadGateway => 502,
            StatusClass::NotFound => 404,
            StatusClass::InternalError => 500,
        }
    }
}

impl ErrorKind {
    pub fn status_class(self) -> StatusClass {
        match self {
            ErrorKind::PackageMissing
            | ErrorKind::WrongPackageFormat
            | ErrorKind::ConcurrencyConflict
            | ErrorKind::InvalidTransition => StatusClass::PreconditionFailed,
            ErrorKind::PackageNotCompliant
            | ErrorKind::ManifestFormatInvalid
            | ErrorKind::MissingDescriptor => StatusClass::NotAcceptable,
            ErrorKind::MissingDependency
            | ErrorKind::ValidationFailed
            | ErrorKind::DuplicateEntity => StatusClass::Unprocessable,
            ErrorKind::OrchestratorRejected | ErrorKind::OrchestratorUnreachable => {
                StatusClass::BadGateway
            }
            ErrorKind::EntityNotFound => StatusClass::NotFound,
            ErrorKind::Internal => StatusClass::InternalError,
        }
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::PackageMissing(_) => ErrorKind::PackageMissing,
            CoreError::WrongPackageFormat(_) => ErrorKind::WrongPackageFormat,
            CoreError::PackageNotCompliant(_) => ErrorKind::PackageNotCompliant,
            CoreError::ManifestFormatInvalid(_) => ErrorKind::ManifestFormatInvalid,
            CoreError::MissingDescriptor(_) => ErrorKind::MissingDescriptor,
            CoreError::MissingDependency(_) => ErrorKind::MissingDependency,
            CoreError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            CoreError::Orchestrator(e) => match e {
                VnsfoError::WrongPackageFormat(_) => ErrorKind::WrongPackageFormat,
                VnsfoError::MissingDescriptor(_) => ErrorKind::MissingDescriptor,
                VnsfoError::Rejected { .. } => ErrorKind::OrchestratorRejected,
                VnsfoError::Unreachable { .. } => ErrorKind::OrchestratorUnreachable,
                VnsfoError::UnsupportedOrchestrator(_)
                | VnsfoError::Config(_)
                | VnsfoError::Io(_) => ErrorKind::Internal,
            },
            CoreError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            CoreError::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            CoreError::DuplicateEntity { .. } => ErrorKind::DuplicateEntity,
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::Store(_)
            | CoreError::Settings(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn status_class(&self) -> StatusClass {
        self.kind().status_class()
    }
}

/// A failed onboarding attempt, with the validation record it produced (if any).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct OnboardingFailure {
    #[source]
    pub error: CoreError,
    pub validation: Option<RecordId>,
}

impl OnboardingFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn status_class(&self) -> StatusClass {
        self.error.status_class()
    }

    /// Response body for the external layer: status class, kind, message, and the
    /// validation record reference.
    pub fn to_response(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status_class().http_status(),
            "kind": self.kind(),
            "message": self.error.to_string(),
            "validation": self.validation,
        })
    }
}

impl From<CoreError> for OnboardingFailure {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            validation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstore_store::{Collection, StoreError};

    #[test]
    fn local_kinds_map_to_their_classes() {
        let cases = [
            (CoreError::PackageMissing(String::new()), 412),
            (CoreError::WrongPackageFormat(String::new()), 412),
            (CoreError::PackageNotCompliant(String::new()), 406),
            (CoreError::ManifestFormatInvalid(String::new()), 406),
            (CoreError::MissingDescriptor(String::new()), 406),
            (CoreError::MissingDependency("v2".into()), 422),
            (CoreError::ValidationFailed { errors: 1 }, 422),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_class().http_status(), status, "{error}");
        }
    }

    #[test]
    fn orchestrator_errors_keep_their_meaning() {
        let rejected = CoreError::from(VnsfoError::Rejected {
            url: "u".to_owned(),
            status: 500,
            reason: String::new(),
        });
        assert_eq!(rejected.kind(), ErrorKind::OrchestratorRejected);
        assert_eq!(rejected.status_class(), StatusClass::BadGateway);

        let unreachable = CoreError::from(VnsfoError::Unreachable {
            url: "u".to_owned(),
            reason: "refused".to_owned(),
        });
        assert_eq!(unreachable.kind(), ErrorKind::OrchestratorUnreachable);
        assert_eq!(unreachable.status_class(), StatusClass::BadGateway);

        let layout = CoreError::from(VnsfoError::MissingDescriptor("d".to_owned()));
        assert_eq!(layout.kind(), ErrorKind::MissingDescriptor);
        let format = CoreError::from(VnsfoError::WrongPackageFormat("d".to_owned()));
        assert_eq!(format.kind(), ErrorKind::WrongPackageFormat);
    }

    #[test]
    fn store_conflict_becomes_concurrency_conflict() {
        let e = CoreError::from(StoreError::Conflict {
            collection: Collection::Vnsfs,
            id: "v".to_owned(),
        });
        assert_eq!(e.kind(), ErrorKind::ConcurrencyConflict);
        assert_eq!(e.status_class(), StatusClass::PreconditionFailed);

        let other = CoreError::from(StoreError::MediaNotFound("m".to_owned()));
        assert_eq!(other.kind(), ErrorKind::Internal);
    }

    #[test]
    fn failure_response_carries_validation_reference() {
        let failure = OnboardingFailure {
            error: CoreError::ValidationFailed { errors: 2 },
            validation: Some("abc".into()),
        };
        let body = failure.to_response();
        assert_eq!(body["status"], 422);
        assert_eq!(body["kind"], "ValidationFailed");
        assert_eq!(body["validation"], "abc");
        assert!(body["message"].as_str().unwrap().contains("2 error"));
    }
}
