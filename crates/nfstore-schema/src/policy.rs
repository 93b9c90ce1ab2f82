use serde::{Deserialize, Serialize};

/// A security policy recommendation destined for a tenant's running network functions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub tenant_id: String,
    /// Time the threat was detected (ISO 8601).
    pub detection: String,
    pub severity: i64,
    pub status: String,
    pub attack: String,
    /// The countermeasure; this is what orchestrators actually receive.
    pub recommendation: String,
}
