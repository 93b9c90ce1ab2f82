use crate::package::{validator_for, PackageValidator};
use crate::{
    OnboardedPackage, OrchestratorAdapter, OrchestratorConfig, OrchestratorKind, VnsfoError,
};
use multipart::client::lazy::Multipart;
use nfstore_schema::{EntityId, EntityKind, SecurityPolicy, TenantId};
use std::fs;
use std::io::Read;
use std::path::Path;

const MAX_REASON_LEN: usize = 256;

/// Open Source MANO adapter.
///
/// Talks to the orchestrator's package API:
/// - `POST   /package/onboard` multipart upload (field `package`), expects 202
/// - `DELETE /package/<id>`    expects 200 or 202
/// - `POST   /vnsf/action`     `{"action": "set-policies", ...}`, expects 200
///
/// Every request is bounded by the configured timeout; a timeout is reported as
/// [`VnsfoError::Unreachable`] like any other transport failure.
pub struct OsmAdapter {
    config: OrchestratorConfig,
    agent: ureq::Agent,
    validator: Box<dyn PackageValidator>,
}

impl OsmAdapter {
    pub fn new(config: OrchestratorConfig, temp_root: Option<&Path>) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        let validator = validator_for(OrchestratorKind::Osm, temp_root);
        Self {
            config,
            agent,
            validator,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.url)
    }

    /// Map a finished exchange onto success or the matching error kind.
    fn finish(
        url: &str,
        result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
        accepted: &[u16],
    ) -> Result<Vec<u8>, VnsfoError> {
        let response = match result {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(VnsfoError::Rejected {
                    url: url.to_owned(),
                    status: code,
                    reason: String::new(),
                });
            }
            Err(e) => {
                return Err(VnsfoError::Unreachable {
                    url: url.to_owned(),
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        let mut body = Vec::new();
        let read = response.into_body().into_reader().read_to_end(&mut body);

        if !accepted.contains(&status.as_u16()) {
            let mut reason = status.canonical_reason().unwrap_or_default().to_owned();
            let detail = String::from_utf8_lossy(&body);
            let detail = detail.trim();
            if !detail.is_empty() {
                reason.push_str(": ");
                reason.extend(detail.chars().take(MAX_REASON_LEN));
            }
            return Err(VnsfoError::Rejected {
                url: url.to_owned(),
                status: status.as_u16(),
                reason,
            });
        }

        read.map_err(|e| VnsfoError::Unreachable {
            url: url.to_owned(),
            reason: format!("failed to read response: {e}"),
        })?;
        Ok(body)
    }
}

/// `{"id": "..."}` in an acceptance response names the id the orchestrator assigned.
fn assigned_id_from(body: &[u8]) -> Option<EntityId> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let id = value.get("id")?.as_str()?.trim();
    (!id.is_empty()).then(|| EntityId::new(id))
}

/// Encode `data` as a `multipart/form-data` body with one file field, returning the
/// boundary and the encoded body.
fn multipart_form(
    field: &str,
    filename: &str,
    data: &[u8],
) -> std::io::Result<(String, Vec<u8>)> {
    let mut form = Multipart::new();
    form.add_stream(
        field,
        data,
        Some(filename),
        "application/gzip".parse::<mime::Mime>().ok(),
    );
    let mut prepared = form.prepare().map_err(|e| e.error)?;
    let mut body = Vec::new();
    prepared.read_to_end(&mut body)?;
    Ok((prepared.boundary().to_owned(), body))
}

impl OrchestratorAdapter for OsmAdapter {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Osm
    }

    fn onboard(
        &self,
        tenant: &TenantId,
        package: &Path,
        descriptor_rel: &str,
        kind: EntityKind,
    ) -> Result<OnboardedPackage, VnsfoError> {
        let validated = self.validator.validate(package, descriptor_rel, kind)?;

        let data = fs::read(package)?;
        let filename = package
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("package.tar.gz")
            .replace('"', "");
        let (boundary, body) = multipart_form("package", &filename, &data)?;

        let url = self.url("package/onboard");
        tracing::info!("onboarding {kind} package '{filename}' for tenant {tenant} at {url}");
        let result = self
            .agent
            .post(&url)
            .header(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send(&body[..]);
        let response = Self::finish(&url, result, &[202])?;

        let summary = validated.summary;
        let assigned_id =
            assigned_id_from(&response).unwrap_or_else(|| EntityId::new(summary.id));
        tracing::debug!("orchestrator accepted '{filename}' as {assigned_id}");

        Ok(OnboardedPackage {
            assigned_id,
            name: summary.name,
            descriptor: validated.canonical_descriptor,
            constituent_refs: summary.constituent_refs,
        })
    }

    fn decommission(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<(), VnsfoError> {
        let url = self.url(&format!("package/{id}"));
        tracing::info!("removing {kind} {id} for tenant {tenant} at {url}");
        let result = self
            .agent
            .delete(&url)
            .header("Content-Type", "application/json")
            .call();
        Self::finish(&url, result, &[200, 202])?;
        Ok(())
    }

    fn apply_policy(&self, tenant: &TenantId, policy: &SecurityPolicy) -> Result<(), VnsfoError> {
        let url = self.url("vnsf/action");
        let payload = serde_json::json!({
            "action": "set-policies",
            "params": { "policy": policy.recommendation },
        });
        let body = serde_json::to_vec(&payload)
            .map_err(|e| VnsfoError::Config(format!("cannot encode policy: {e}")))?;
        tracing::info!(
            "sending '{}' policy for tenant {tenant} to {url}",
            policy.attack
        );
        let result = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(&body[..]);
        Self::finish(&url, result, &[200])?;
        Ok(())
    }
}
