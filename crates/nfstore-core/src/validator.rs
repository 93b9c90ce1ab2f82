//! Descriptor content validation.
//!
//! The pipeline hands the descriptor (and, for services, the constituent descriptors) to
//! a [`DescriptorValidator`]; its [`ValidationRecord`] is persisted either way, and any
//! error in it fails the attempt.

use crate::dependencies::ResolvedConstituent;
use nfstore_schema::{summarize_descriptor, EntityId, EntityKind, ValidationRecord};
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub struct ValidationInput<'a> {
    pub kind: EntityKind,
    /// Raw descriptor bytes as found in the package.
    pub descriptor: &'a [u8],
    /// Constituent ids declared by the manifest. Empty for vNSFs.
    pub declared: &'a [EntityId],
    pub constituents: &'a [ResolvedConstituent],
}

pub trait DescriptorValidator: Send + Sync {
    fn validate(&self, input: &ValidationInput<'_>) -> ValidationRecord;
}

/// Built-in validator: checks the descriptor catalogue shape and, for services, that
/// every constituent reference is satisfied by a supplied vNSF descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl DescriptorValidator for StructuralValidator {
    fn validate(&self, input: &ValidationInput<'_>) -> ValidationRecord {
        let mut record = ValidationRecord::new(input.kind);
        record.log.push_str(&format!("validating {} descriptor\n", input.kind));

        let Ok(text) = std::str::from_utf8(input.descriptor) else {
            record.error("descriptor is not UTF-8 text");
            return record;
        };
        let summary = match summarize_descriptor(text, input.kind) {
            Ok(summary) => summary,
            Err(e) => {
                record.error(format!("descriptor: {e}"));
                return record;
            }
        };
        if summary.name.is_none() {
            record.warning(format!("descriptor '{}' has no name", summary.id));
        }

        match input.kind {
            EntityKind::Vnsf => {
                record.topology = json!({ "nodes": [summary.id] });
            }
            EntityKind::Ns => {
                check_constituents(&mut record, &summary.constituent_refs, input);
                record.topology = json!({
                    "nodes": input.declared,
                    "links": summary.constituent_refs,
                });
                if let Some(graphs) = &summary.forwarding_graphs {
                    record.fwgraph = serde_json::to_value(graphs).unwrap_or(Value::Null);
                }
            }
        }

        record.log.push_str(&format!(
            "{} error(s), {} warning(s)\n",
            record.result.error_count, record.result.warning_count
        ));
        record
    }
}

fn check_constituents(record: &mut ValidationRecord, refs: &[String], input: &ValidationInput<'_>) {
    let mut supplied = BTreeSet::new();
    for constituent in input.constituents {
        match summarize_descriptor(&constituent.descriptor, EntityKind::Vnsf) {
            Ok(summary) => {
                supplied.insert(summary.id);
            }
            Err(_) => record.warning(format!(
                "descriptor of constituent '{}' could not be read",
                constituent.id
            )),
        }
    }
    let declared: BTreeSet<&str> = input.declared.iter().map(EntityId::as_str).collect();

    if refs.is_empty() {
        record.error("service descriptor references no constituent vNSF");
    }
    for reference in refs {
        if !supplied.contains(reference) {
            record.error(format!(
                "constituent '{reference}' does not match any supplied vNSF descriptor"
            ));
        }
        if !declared.contains(reference.as_str()) {
            record.warning(format!(
                "descriptor references '{reference}', which the manifest does not list"
            ));
        }
    }
    for id in &declared {
        if !refs.iter().any(|r| r == id) {
            record.warning(format!("manifest lists '{id}', which the descriptor never uses"));
        }
    }
}
