use crate::types::EntityKind;
use serde::{Deserialize, Serialize};

/// Error/warning tally of a descriptor validation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub error_count: u32,
    pub warning_count: u32,
    pub issues: Vec<String>,
}

/// Structured outcome of validating one package's descriptor(s).
///
/// One record is produced per onboarding attempt that reaches the validation step, and
/// it is persisted whether or not the attempt succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationRecord {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub result: ValidationResult,
    /// Network topology snapshot.
    #[serde(default)]
    pub topology: serde_json::Value,
    /// Forwarding graph snapshot.
    #[serde(default)]
    pub fwgraph: serde_json::Value,
    #[serde(default)]
    pub log: String,
}

impl ValidationRecord {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            result: ValidationResult::default(),
            topology: serde_json::Value::Object(serde_json::Map::new()),
            fwgraph: serde_json::Value::Object(serde_json::Map::new()),
            log: String::new(),
        }
    }

    pub fn error(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        self.log.push_str(&format!("ERROR: {issue}\n"));
        self.result.error_count += 1;
        self.result.issues.push(issue);
    }

    pub fn warning(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        self.log.push_str(&format!("WARNING: {issue}\n"));
        self.result.warning_count += 1;
        self.result.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        self.result.error_count > 0
    }

    pub fn has_issues(&self) -> bool {
        self.result.error_count > 0 || self.result.warning_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_reported_issues() {
        let mut record = ValidationRecord::new(EntityKind::Ns);
        assert!(!record.has_issues());
        record.warning("unused forwarding graph");
        assert!(record.has_issues());
        assert!(!record.has_errors());
        record.error("dangling reference");
        assert_eq!(record.result.error_count, 1);
        assert_eq!(record.result.warning_count, 1);
        assert_eq!(record.result.issues.len(), 2);
        assert!(record.log.contains("ERROR: dangling reference"));
    }

    #[test]
    fn serializes_kind_as_type() {
        let record = ValidationRecord::new(EntityKind::Vnsf);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "vNSF");
        assert_eq!(json["result"]["error_count"], 0);
    }
}
