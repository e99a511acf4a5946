//! Project configuration (`stagehand.yaml`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_engine::{AliasDefinition, AliasRegistry, EngineReference};

use crate::build::BuildSpec;
use crate::error::{OrchestratorError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "stagehand.yaml";
pub const DEFAULT_STORE_PATH: &str = ".stagehand/artifacts.json";
pub const DEFAULT_BUILD_DIR: &str = "build";
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// One `test:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStageConfig {
    pub name: String,
    /// Setup engine: absent, a direct reference, or an alias to a chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testenv: Option<EngineReference>,
}

/// Whole project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_store_path")]
    pub artifact_store_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmp_root: Option<PathBuf>,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,
    /// Bound on spawn plus `initialize`. Raise it when engines are fetched
    /// and compiled on first use.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default)]
    pub build: Vec<BuildSpec>,
    #[serde(default)]
    pub test: Vec<TestStageConfig>,
    #[serde(default)]
    pub engines: Vec<AliasDefinition>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root_dir: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BUILD_DIR)
}

fn default_engine_timeout_secs() -> u64 {
    DEFAULT_ENGINE_TIMEOUT_SECS
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

impl ProjectConfig {
    /// Load and validate a config file; relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let root = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_yaml_str(&content, root)
    }

    pub fn from_yaml_str(content: &str, root_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: ProjectConfig = serde_yaml::from_str(content)
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        config.root_dir = root_dir.into();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine_timeout_secs == 0 {
            return Err(OrchestratorError::Config(
                "engineTimeoutSecs must be greater than zero".to_string(),
            ));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(OrchestratorError::Config(
                "handshakeTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for def in &self.engines {
            if def.alias.trim().is_empty() {
                return Err(OrchestratorError::Config("engine alias must not be empty".into()));
            }
            if !seen.insert(def.alias.as_str()) {
                return Err(OrchestratorError::Config(format!(
                    "duplicate engine alias: {}",
                    def.alias
                )));
            }
            if def.chain().is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "engine alias {} has no {} entries",
                    def.alias, def.role
                )));
            }
        }

        let mut stages = BTreeSet::new();
        for stage in &self.test {
            if stage.name.trim().is_empty() {
                return Err(OrchestratorError::Config("test stage name must not be empty".into()));
            }
            if !stages.insert(stage.name.as_str()) {
                return Err(OrchestratorError::Config(format!(
                    "duplicate test stage: {}",
                    stage.name
                )));
            }
        }
        Ok(())
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve_path(&self.artifact_store_path)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve_path(&self.build_dir)
    }

    /// Parent of every test environment's working directory.
    pub fn tmp_root(&self) -> PathBuf {
        match &self.tmp_root {
            Some(p) => self.resolve_path(p),
            None => std::env::temp_dir().join("stagehand"),
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn aliases(&self) -> AliasRegistry {
        AliasRegistry::new(self.engines.iter().cloned())
    }
}
