//! Deployment settings: where the catalogue lives, where packages are staged, and
//! which orchestrator to talk to.

use crate::CoreError;
use nfstore_vnsfo::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default catalogue location, relative to the working directory.
pub const DEFAULT_STORE_ROOT: &str = "nfstore-data";

/// ```toml
/// store_root = "/var/lib/nfstore"
/// temp_root = "/var/tmp/nfstore"
///
/// [orchestrator]
/// kind = "OSM"
/// url = "http://osm.example:8448/api"
/// tenant_id = "operator"
/// timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    /// Staging area for uploads and extracted trees. `None` means the OS temp dir.
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

fn default_store_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_ROOT)
}

impl Settings {
    pub fn new(store_root: impl Into<PathBuf>, orchestrator: OrchestratorConfig) -> Self {
        Self {
            store_root: store_root.into(),
            temp_root: None,
            orchestrator,
        }
    }

    #[must_use]
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Settings(format!("{}: {e}", path.display())))?;
        settings.orchestrator.url = settings.orchestrator.url.trim_end_matches('/').to_owned();
        Ok(settings)
    }

    /// `NFSTORE_ROOT` and `NFSTORE_TMPDIR` select the directories; the orchestrator
    /// comes from the `VNSFO_*` variables.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let orchestrator = OrchestratorConfig::from_lookup(&lookup)
            .map_err(|e| CoreError::Settings(e.to_string()))?;
        Ok(Self {
            store_root: var("NFSTORE_ROOT").map_or_else(default_store_root, PathBuf::from),
            temp_root: var("NFSTORE_TMPDIR").map(PathBuf::from),
            orchestrator,
        })
    }
}
