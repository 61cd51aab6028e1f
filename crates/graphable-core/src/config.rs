//! Analysis configuration.
//!
//! Configuration is optional: every field has a default, and a missing file
//! yields [`GraphConfig::default`]. Files are TOML:
//!
//! ```toml
//! slack_tolerance = 1e-6
//! max_paths = 10000
//! discover_on_build = true
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Tunables shared by every graph built with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Absolute tolerance when comparing CPM times (zero slack, chain
    /// continuity).
    #[serde(default = "default_slack_tolerance")]
    pub slack_tolerance: f64,
    /// Upper bound on the number of paths yielded by `all_paths`.
    #[serde(default)]
    pub max_paths: Option<usize>,
    /// Run `discover()` after inserting the initial node set.
    #[serde(default)]
    pub discover_on_build: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            slack_tolerance: default_slack_tolerance(),
            max_paths: None,
            discover_on_build: false,
        }
    }
}

const fn default_slack_tolerance() -> f64 {
    1e-9
}

impl GraphConfig {
    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema or
    /// fails [`GraphConfig::validate`].
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse graph config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no graph config, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error for a negative or non-finite tolerance, or a zero
    /// path cap.
    pub fn validate(&self) -> Result<()> {
        if !self.slack_tolerance.is_finite() || self.slack_tolerance < 0.0 {
            bail!(
                "slack_tolerance must be finite and non-negative, got {}",
                self.slack_tolerance
            );
        }
        if self.max_paths == Some(0) {
            bail!("max_paths must be at least 1 when set");
        }
        Ok(())
    }
}
