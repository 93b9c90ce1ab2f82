//! Read-only view over OSM descriptor catalogues.
//!
//! Descriptors are opaque to the catalogue except for a handful of fields: the first
//! catalogue entry's `id` (and `name` for services), the constituent vNSF references of
//! a service, and its forwarding graphs. The layout follows the OSM catalogue shape:
//!
//! ```yaml
//! nsd:nsd-catalog:
//!   nsd:
//!   - id: cirros_2vnf_nsd
//!     name: cirros_2vnf_ns
//!     constituent-vnfd:
//!     - member-vnf-index: 1
//!       vnfd-id-ref: cirros_vnfd
//! ```

use crate::types::EntityKind;
use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to parse descriptor: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("descriptor is not a catalogue mapping")]
    NotACatalogue,
    #[error("descriptor catalogue has no '{0}' entries")]
    MissingEntries(&'static str),
    #[error("descriptor entry has no '{0}'")]
    MissingField(&'static str),
    #[error("constituent #{0} has no 'vnfd-id-ref'")]
    MissingConstituentRef(usize),
}

/// The fields of a descriptor the catalogue relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSummary {
    pub kind: EntityKind,
    pub id: String,
    pub name: Option<String>,
    /// `constituent-vnfd[].vnfd-id-ref`, in document order. Empty for vNSFs.
    pub constituent_refs: Vec<String>,
    /// The `vnffgd` section of a service descriptor, if any.
    pub forwarding_graphs: Option<Value>,
    /// The whole parsed document.
    pub document: Value,
}

impl DescriptorSummary {
    /// Canonical YAML rendering of the parsed document.
    pub fn canonical(&self) -> Result<String, DescriptorError> {
        Ok(serde_yaml::to_string(&self.document)?)
    }
}

fn entries_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Vnsf => "vnfd",
        EntityKind::Ns => "nsd",
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse descriptor content and extract the summary for the given entity kind.
pub fn summarize_descriptor(
    content: &str,
    kind: EntityKind,
) -> Result<DescriptorSummary, DescriptorError> {
    let document: Value = serde_yaml::from_str(content)?;
    let catalogue = document
        .as_mapping()
        .and_then(|m| m.values().next())
        .and_then(Value::as_mapping)
        .ok_or(DescriptorError::NotACatalogue)?;

    let key = entries_key(kind);
    let entry = catalogue
        .get(key)
        .and_then(Value::as_sequence)
        .and_then(|entries| entries.first())
        .ok_or(DescriptorError::MissingEntries(key))?;

    let id = entry
        .get("id")
        .and_then(scalar_to_string)
        .ok_or(DescriptorError::MissingField("id"))?;
    let name = entry.get("name").and_then(scalar_to_string);

    let mut constituent_refs = Vec::new();
    let mut forwarding_graphs = None;
    if kind == EntityKind::Ns {
        if let Some(constituents) = entry.get("constituent-vnfd").and_then(Value::as_sequence) {
            for (idx, c) in constituents.iter().enumerate() {
                let reference = c
                    .get("vnfd-id-ref")
                    .and_then(scalar_to_string)
                    .ok_or(DescriptorError::MissingConstituentRef(idx))?;
                constituent_refs.push(reference);
            }
        }
        forwarding_graphs = entry.get("vnffgd").cloned();
    }

    Ok(DescriptorSummary {
        kind,
        id,
        name,
        constituent_refs,
        forwarding_graphs,
        document,
    })
}
