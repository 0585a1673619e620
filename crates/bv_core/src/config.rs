//! Engine configuration
//!
//! Every tunable constant in one serializable tree. Missing sections and fields
//! fall back to their defaults, so a config file only needs the overrides.
//! Files are JSON or YAML, chosen by extension.

use std::path::Path;
use std::{env, fs};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

pub use crate::engine::match_sim::ComposerConfig;
pub use crate::engine::modifiers::ModifierConfig;
pub use crate::engine::probability::ProbabilityConfig;
pub use crate::engine::rally::RallyConfig;
pub use crate::simulation::monte_carlo::SimulationLimits;

/// Env var holding the path of an engine config file.
pub const ENGINE_CONFIG_PATH_ENV: &str = "BV_ENGINE_CONFIG_PATH";

static GLOBAL_CONFIG: OnceCell<EngineConfig> = OnceCell::new();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub probability: ProbabilityConfig,
    pub modifiers: ModifierConfig,
    pub rally: RallyConfig,
    pub composer: ComposerConfig,
    pub simulation: SimulationLimits,
}

impl EngineConfig {
    /// Read, parse and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("failed to read engine config '{}': {e}", path.display()))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| SimError::Config(format!("invalid YAML in '{}': {e}", path.display())))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| SimError::Config(format!("invalid JSON in '{}': {e}", path.display())))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Config from the file named by `BV_ENGINE_CONFIG_PATH`, or the defaults
    /// when the variable is unset or blank.
    pub fn from_env_or_default() -> Result<Self> {
        let Ok(path) = env::var(ENGINE_CONFIG_PATH_ENV) else {
            return Ok(Self::default());
        };
        let path = path.trim();
        if path.is_empty() {
            return Ok(Self::default());
        }
        Self::from_path(path).map_err(|e| match e {
            SimError::Config(reason) => {
                SimError::Config(format!("{ENGINE_CONFIG_PATH_ENV}='{path}': {reason}"))
            }
            other => other,
        })
    }

    /// Process-wide config, loaded from the environment on first use.
    pub fn global() -> Result<&'static EngineConfig> {
        GLOBAL_CONFIG.get_or_try_init(Self::from_env_or_default)
    }

    pub fn validate(&self) -> Result<()> {
        self.probability.validate().map_err(SimError::Config)?;
        self.modifiers.validate().map_err(SimError::Config)?;
        self.simulation.validate().map_err(SimError::Config)?;
        if self.rally.max_transitions == 0 {
            return Err(SimError::Config("rally.max_transitions must be at least 1".to_string()));
        }
        Ok(())
    }
}
