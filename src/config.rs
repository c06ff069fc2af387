//! ### Config
//! Pipeline settings, read from an optional YAML file. Every field has a
//! default so an empty file (or no file) is valid.

use crate::error::{ProfileError, ProfileResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Network nodes; `flows_by_w__name_<node>` is loaded for each.
    pub nodes: Vec<String>,
    /// Technology map column holding group ids.
    pub grouping_column: String,
    /// Technology map column holding display colors.
    pub coloring_column: String,
    /// Bucket size of the full-horizon view, in base timesteps.
    pub granularity: u32,
    /// Storage rows plotted per period on the dashboard.
    pub storage_window: usize,
    /// Divisor for dashboard values.
    pub dashboard_scale: f64,
    /// Storage columns containing this go on the secondary y-axis.
    pub secondary_axis_marker: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["elec_gb".to_string(), "h2_gb".to_string()],
            grouping_column: "grouping4".to_string(),
            coloring_column: "coloring4".to_string(),
            granularity: 168,
            storage_window: 168,
            dashboard_scale: 1000.,
            secondary_axis_marker: "h2".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn load_yaml(path: &Path) -> ProfileResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            ProfileError::load(path.display().to_string(), format!("bad config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ProfileResult<()> {
        if self.nodes.is_empty() {
            return Err(ProfileError::load("config", "at least one node is required"));
        }
        if self.granularity == 0 {
            return Err(ProfileError::InvalidGranularity {
                granularity: self.granularity,
            });
        }
        if !(self.dashboard_scale.is_finite() && self.dashboard_scale > 0.) {
            return Err(ProfileError::load(
                "config",
                format!("dashboard_scale must be positive, got {}", self.dashboard_scale),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str("nodes: [elec_gb]\ngranularity: 24\n").unwrap();
        assert_eq!(config.nodes, ["elec_gb"]);
        assert_eq!(config.granularity, 24);
        assert_eq!(config.grouping_column, "grouping4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_yaml::from_str::<PipelineConfig>("granularty: 24\n").is_err());
    }

    #[test]
    fn zero_granularity_fails_validation() {
        let config = PipelineConfig {
            granularity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
