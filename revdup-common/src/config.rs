//! Configuration loading and project root resolution
//!
//! Project settings live in `<root>/revdup.toml`. A missing settings file is
//! not an error: defaults are used and a warning is logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the project root
pub const ROOT_ENV_VAR: &str = "REVDUP_ROOT";

/// Settings file name inside the project root
pub const SETTINGS_FILE: &str = "revdup.toml";

/// Policy applied to merges between records sharing a (non-metadata) source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSourcePolicy {
    /// Reject the merge, count it, export it to the same-source report
    Prevent,
    /// Apply the merge and log a warning
    Warn,
}

impl Default for SameSourcePolicy {
    fn default() -> Self {
        SameSourcePolicy::Prevent
    }
}

/// Deduplication settings (`[dedupe]` table)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupeSettings {
    /// Similarity at or below which a pair is a non-duplicate
    pub non_dup_threshold: f64,
    /// Similarity at or above which a pair is a duplicate
    pub dup_threshold: f64,
    /// Minimum pair score for an edge in the match graph
    pub partition_threshold: f64,
    /// Minimum mean cluster score for a cluster to be merged
    pub merge_threshold: f64,
    /// Blocks larger than this are skipped with a warning
    pub max_block_size: usize,
    /// Training sample size when the store is not processed in memory
    pub sample_size: usize,
    /// Smallest sample accepted for active learning
    pub min_sample_size: usize,
    /// Labels after which training finishes automatically
    pub max_associations_to_check: usize,
    /// Record ceiling for the similarity-only mode (unless forced)
    pub simple_mode_ceiling: usize,
    /// Same-source merge policy
    pub same_source_policy: SameSourcePolicy,
    /// Provenance source prefixes preferred on masterdata conflicts
    pub preferred_masterdata_sources: Vec<String>,
    /// Promote every remaining md_prepared record to md_processed
    pub complete_dedupe: bool,
    /// Allow merges across bibliographic levels (proceedings/inproceedings, book/inbook)
    pub force_cross_level: bool,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            non_dup_threshold: 0.7,
            dup_threshold: 0.95,
            partition_threshold: 0.5,
            merge_threshold: 0.8,
            max_block_size: 1000,
            sample_size: 1500,
            min_sample_size: 50,
            max_associations_to_check: 1000,
            simple_mode_ceiling: 40,
            same_source_policy: SameSourcePolicy::default(),
            preferred_masterdata_sources: Vec::new(),
            complete_dedupe: true,
            force_cross_level: false,
        }
    }
}

impl DedupeSettings {
    /// Check threshold ordering and ranges
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("non_dup_threshold", self.non_dup_threshold),
            ("dup_threshold", self.dup_threshold),
            ("partition_threshold", self.partition_threshold),
            ("merge_threshold", self.merge_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.non_dup_threshold >= self.dup_threshold {
            return Err(Error::Config(format!(
                "non_dup_threshold ({}) must be below dup_threshold ({})",
                self.non_dup_threshold, self.dup_threshold
            )));
        }
        if self.max_block_size == 0 {
            return Err(Error::Config("max_block_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Contents of `revdup.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectSettings {
    pub dedupe: DedupeSettings,
}

/// Load `<root>/revdup.toml`, falling back to defaults when it does not exist
pub fn load_project_settings(root: &Path) -> Result<ProjectSettings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        warn!(path = %path.display(), "Settings file not found, using defaults");
        return Ok(ProjectSettings::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: ProjectSettings = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    settings.dedupe.validate()?;
    debug!(path = %path.display(), "Loaded project settings");
    Ok(settings)
}

/// Write `<root>/revdup.toml`
pub fn save_project_settings(root: &Path, settings: &ProjectSettings) -> Result<()> {
    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;
    std::fs::write(root.join(SETTINGS_FILE), content)?;
    Ok(())
}

/// Create the project root and write a default `revdup.toml` into it
///
/// An existing settings file is left alone; returns whether one was written.
pub fn init_project_settings(root: &Path) -> Result<bool> {
    std::fs::create_dir_all(root)?;
    if root.join(SETTINGS_FILE).exists() {
        debug!(root = %root.display(), "Settings file already present");
        return Ok(false);
    }
    save_project_settings(root, &ProjectSettings::default())?;
    info!(root = %root.display(), "Wrote default project settings");
    Ok(true)
}

/// Project root resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` in the user TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config_path) = user_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent default
    default_root_folder()
}

/// `~/.config/revdup/config.toml` (platform equivalent), if it exists
fn user_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("revdup").join("config.toml");
    path.exists().then_some(path)
}

/// OS-dependent default project root
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("revdup"))
        .unwrap_or_else(|| PathBuf::from("./revdup_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = DedupeSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.same_source_policy, SameSourcePolicy::Prevent);
        assert_eq!(settings.max_block_size, 1000);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let settings = DedupeSettings {
            non_dup_threshold: 0.96,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: ProjectSettings =
            toml::from_str("[dedupe]\nsame_source_policy = \"warn\"\nmerge_threshold = 0.9\n").unwrap();
        assert_eq!(settings.dedupe.same_source_policy, SameSourcePolicy::Warn);
        assert_eq!(settings.dedupe.merge_threshold, 0.9);
        assert_eq!(settings.dedupe.dup_threshold, 0.95);
    }

    #[test]
    fn test_cli_arg_wins() {
        let path = resolve_root_folder(Some("/tmp/revdup-cli"), "REVDUP_TEST_UNSET_VAR");
        assert_eq!(path, PathBuf::from("/tmp/revdup-cli"));
    }
}
