use crate::VnsfoError;
use nfstore_schema::{ArtifactType, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TENANT: &str = "default";

/// Orchestrator families an adapter exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorKind {
    #[serde(rename = "OSM")]
    Osm,
}

impl OrchestratorKind {
    /// Whether this family registers packages declared as `artifact`.
    pub fn accepts(self, artifact: ArtifactType) -> bool {
        match self {
            OrchestratorKind::Osm => matches!(
                artifact,
                ArtifactType::Osm | ArtifactType::OsmR2 | ArtifactType::OsmR4
            ),
        }
    }
}

impl FromStr for OrchestratorKind {
    type Err = VnsfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OSM" | "OSM-R2" | "OSM-R4" => Ok(OrchestratorKind::Osm),
            _ => Err(VnsfoError::UnsupportedOrchestrator(s.to_owned())),
        }
    }
}

impl fmt::Display for OrchestratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorKind::Osm => f.write_str("OSM"),
        }
    }
}

fn default_kind() -> OrchestratorKind {
    OrchestratorKind::Osm
}

fn default_tenant() -> TenantId {
    TenantId::new(DEFAULT_TENANT)
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Where and how to reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_kind")]
    pub kind: OrchestratorKind,
    /// Base URL, without trailing slash.
    pub url: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: TenantId,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl OrchestratorConfig {
    pub fn new(url: &str) -> Self {
        Self {
            kind: default_kind(),
            url: url.trim_end_matches('/').to_owned(),
            tenant_id: default_tenant(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant: &str) -> Self {
        self.tenant_id = TenantId::new(tenant);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Build the config from the deployment variables.
    ///
    /// `VNSFO_HOST` is required. `VNSFO_PROTOCOL` defaults to `http`; `VNSFO_PORT` and
    /// `VNSFO_API` (a path prefix) are optional. `VNSFO_TENANT_ID` and
    /// `VNSFO_TIMEOUT_SECS` override the defaults.
    pub fn from_env() -> Result<Self, VnsfoError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`OrchestratorConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VnsfoError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("VNSFO_HOST")
            .ok_or_else(|| VnsfoError::Config("VNSFO_HOST is not set".to_owned()))?;
        let protocol = var("VNSFO_PROTOCOL").unwrap_or_else(|| "http".to_owned());
        let mut url = format!("{protocol}://{host}");
        if let Some(port) = var("VNSFO_PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| VnsfoError::Config(format!("invalid VNSFO_PORT '{port}'")))?;
            url.push_str(&format!(":{port}"));
        }
        if let Some(api) = var("VNSFO_API") {
            url.push('/');
            url.push_str(api.trim_matches('/'));
        }

        let mut config = Self::new(&url);
        if let Some(tenant) = var("VNSFO_TENANT_ID") {
            config.tenant_id = TenantId::new(tenant);
        }
        if let Some(secs) = var("VNSFO_TIMEOUT_SECS") {
            config.timeout_secs = secs
                .parse()
                .map_err(|_| VnsfoError::Config(format!("invalid VNSFO_TIMEOUT_SECS '{secs}'")))?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, VnsfoError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| VnsfoError::Config(format!("invalid orchestrator config: {e}")))?;
        config.url = config.url.trim_end_matches('/').to_owned();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), VnsfoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| VnsfoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
