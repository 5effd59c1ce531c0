//! Configuration types and validation for analysis and wiping

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    cleaner::WipePlan,
    error::{Error, Result},
    hash::HashAlgorithm,
};

/// Smallest chunk accepted by either operation
pub const MIN_CHUNK_SIZE: usize = 512;
/// Largest chunk accepted; bounds per-operation memory
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for a single analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Bytes read per chunk
    pub chunk_size: usize,
    /// Leading bytes inspected by the type classifier
    pub leading_window: usize,
    /// Re-read the tail for signatures that declare a trailer
    pub confirm_trailers: bool,
    /// Digest algorithms computed during the pass
    pub algorithms: Vec<HashAlgorithm>,
    /// Block size for the entropy profile, `None` disables it
    pub entropy_block_size: Option<usize>,
    /// Run the digest and entropy accumulators concurrently per chunk
    pub parallel_fanout: bool,
}

/// Configuration for the secure wipe engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WipeConfig {
    /// Bytes generated and written per chunk
    pub chunk_size: usize,
    /// Rename the file to a random name before unlinking it
    pub obscure_name: bool,
    /// Truncate to zero length after the last pass, before unlinking
    pub truncate_before_remove: bool,
    /// Custom plan used when no preset is named
    pub plan: Option<WipePlan>,
}

/// Top-level settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub analysis: AnalysisConfig,
    pub wipe: WipeConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            leading_window: 64,
            confirm_trailers: true,
            algorithms: HashAlgorithm::DEFAULT_SET.to_vec(),
            entropy_block_size: Some(64 * 1024),
            parallel_fanout: true,
        }
    }
}

impl Default for WipeConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            obscure_name: true,
            truncate_before_remove: true,
            plan: None,
        }
    }
}

fn validate_chunk_size(name: &str, size: usize) -> Result<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&size) {
        return Err(Error::Config(format!(
            "{name} must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE} bytes, got {size}"
        )));
    }
    Ok(())
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size("analysis.chunk_size", self.chunk_size)?;
        if self.leading_window == 0 || self.leading_window > 4096 {
            return Err(Error::Config(
                "analysis.leading_window must be between 1 and 4096 bytes".into(),
            ));
        }
        if self.algorithms.is_empty() {
            return Err(Error::Config(
                "analysis.algorithms must name at least one digest".into(),
            ));
        }
        if let Some(block) = self.entropy_block_size {
            if block < 256 {
                return Err(Error::Config(
                    "analysis.entropy_block_size must be at least 256 bytes".into(),
                ));
            }
        }
        Ok(())
    }
}

impl WipeConfig {
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size("wipe.chunk_size", self.chunk_size)?;
        if let Some(plan) = &self.plan {
            plan.validate()?;
        }
        Ok(())
    }

    /// The preset called `name` if given, else the configured plan, else
    /// the default plan
    pub fn select_plan(&self, name: Option<&str>) -> Result<WipePlan> {
        match (name, &self.plan) {
            (Some(name), _) => WipePlan::by_name(name),
            (None, Some(plan)) => Ok(plan.clone()),
            (None, None) => Ok(WipePlan::default()),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON or YAML file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let settings: Settings = match ext.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid JSON settings: {}", e)))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid YAML settings: {}", e)))?,
            _ => {
                return Err(Error::Config(format!(
                    "unsupported settings format: {}",
                    path.display()
                )))
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.wipe.validate()
    }
}
