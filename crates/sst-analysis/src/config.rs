//! Pipeline configuration.
//!
//! Loaded from YAML, optionally overridden from the environment, and
//! validated before a pipeline is built so that malformed settings fail
//! before any source is read.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sst_common::{DateRange, GridSpec, Region};
use tracing::warn;

use crate::error::{AnalysisError, Result};
use crate::scale::ScaleTransform;
use crate::types::SST_BAND;

fn default_band() -> String {
    SST_BAND.to_string()
}

/// Full configuration of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Study area. Carried through to threshold derivation, otherwise opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_area: Option<Region>,

    /// Study period; one monthly raster is produced per month it overlaps.
    pub period: DateRange,

    /// Name of the value band in the merged series.
    #[serde(default = "default_band")]
    pub band: String,

    /// Target grid. Defaults to the grid of the first fetched raster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSpec>,

    /// Point or region sampled for the chart outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Region>,

    /// Raster sources, lowest precedence first.
    pub sources: Vec<SourceConfig>,

    /// Bleaching threshold. Derived from the climatology when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,

    /// Retry policy for transient source failures.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Output layer and chart names.
    #[serde(default)]
    pub outputs: OutputConfig,
}

impl PipelineConfig {
    /// Parse from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            AnalysisError::invalid_config(format!("{}: {}", path.display(), e))
        })
    }

    /// Apply overrides from environment variables.
    ///
    /// - `SST_PERIOD`: study period as `start/end`
    /// - `SST_BAND`: value band name
    /// - `SST_THRESHOLD`: bleaching threshold
    /// - `SST_MAX_RETRIES`: retry attempts per source
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (see [`Self::with_env_overrides`]).
    /// Unparseable values are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SST_PERIOD") {
            match DateRange::parse(&val) {
                Ok(period) => self.period = period,
                Err(e) => warn!(value = %val, error = %e, "Ignoring invalid SST_PERIOD"),
            }
        }

        if let Some(val) = lookup("SST_BAND") {
            self.band = val;
        }

        if let Some(val) = lookup("SST_THRESHOLD") {
            match val.parse() {
                Ok(threshold) => self.threshold = Some(threshold),
                Err(_) => warn!(value = %val, "Ignoring invalid SST_THRESHOLD"),
            }
        }

        if let Some(val) = lookup("SST_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.retry.max_retries = retries;
            }
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.period
            .validate()
            .map_err(|e| AnalysisError::invalid_config(format!("period: {}", e)))?;

        if self.band.trim().is_empty() {
            return Err(AnalysisError::invalid_config("band must not be empty"));
        }

        if let Some(grid) = &self.grid {
            grid.validate()
                .map_err(|e| AnalysisError::invalid_config(format!("grid: {}", e)))?;
        }

        if let Some(area) = &self.study_area {
            area.validate()
                .map_err(|e| AnalysisError::invalid_config(format!("study_area: {}", e)))?;
        }

        if let Some(sample) = &self.sample {
            sample
                .validate()
                .map_err(|e| AnalysisError::invalid_config(format!("sample: {}", e)))?;
        }

        if self.sources.is_empty() {
            return Err(AnalysisError::invalid_config("at least one source is required"));
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !ids.insert(source.id.as_str()) {
                return Err(AnalysisError::invalid_config(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() {
                return Err(AnalysisError::invalid_config("threshold must be finite"));
            }
        }

        self.retry.validate()?;
        Ok(())
    }
}

/// One raster source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Identifier used in logs and reports.
    pub id: String,

    /// Collection passed to the raster source.
    pub collection: String,

    /// Value band in this source's rasters. Defaults to the pipeline band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,

    /// Transform into common units.
    #[serde(default)]
    pub scale: ScaleTransform,

    /// Dates this source is used for. Defaults to the whole study period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<DateRange>,
}

impl SourceConfig {
    /// Band to read from this source's rasters.
    pub fn raw_band<'a>(&'a self, default: &'a str) -> &'a str {
        self.band.as_deref().unwrap_or(default)
    }

    /// Range to fetch for `period`, or `None` when the source's valid range
    /// does not overlap it.
    pub fn fetch_range(&self, period: &DateRange) -> Option<DateRange> {
        match &self.valid_range {
            Some(valid) => valid.intersection(period),
            None => Some(*period),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AnalysisError::invalid_config("source id must not be empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(AnalysisError::invalid_config(format!(
                "source '{}' has an empty collection",
                self.id
            )));
        }
        if let Some(range) = &self.valid_range {
            range.validate().map_err(|e| {
                AnalysisError::invalid_config(format!("source '{}' valid_range: {}", self.id, e))
            })?;
        }
        Ok(())
    }
}

/// Exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles each retry).
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(AnalysisError::invalid_config(
                "retry initial_delay_ms must not exceed max_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Names of the layers and charts written to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub monthly_layer: String,
    pub anomaly_layer: String,
    pub stress_layer: String,
    pub threshold_layer: String,
    pub chart: String,
    /// Display range of the SST layers.
    pub sst_range: (f32, f32),
    /// Display range of the anomaly layer.
    pub anomaly_range: (f32, f32),
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            monthly_layer: "monthly_sst".to_string(),
            anomaly_layer: "sst_anomaly".to_string(),
            stress_layer: "bleaching_stress".to_string(),
            threshold_layer: "bleaching_threshold".to_string(),
            chart: "sst_timeseries".to_string(),
            sst_range: (20.0, 32.0),
            anomaly_range: (-3.0, 3.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
study_area:
  type: polygon
  ring: [[145.0, -20.0], [150.0, -20.0], [150.0, -15.0], [145.0, -15.0]]
period:
  start: "2020-01-01T00:00:00Z"
  end: "2021-01-01T00:00:00Z"
sample:
  type: point
  lon: 147.5
  lat: -17.5
sources:
  - id: avhrr
    collection: sst/avhrr
    valid_range:
      start: "2020-01-01T00:00:00Z"
      end: "2020-07-01T00:00:00Z"
  - id: viirs
    collection: sst/viirs
    band: sea_surface_temperature
    scale:
      multiplier: 0.01
      offset: -273.15
retry:
  max_retries: 5
"#;

    #[test]
    fn test_parse_yaml() {
        let config = PipelineConfig::from_yaml_str(YAML).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.band, SST_BAND);
        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].scale.is_identity());
        assert_eq!(config.sources[1].raw_band(&config.band), "sea_surface_temperature");
        assert_eq!(config.sources[1].scale.multiplier(), 0.01);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.outputs.stress_layer, "bleaching_stress");
        assert!(config.threshold.is_none());
    }

    #[test]
    fn test_fetch_range_clipped_to_period() {
        let config = PipelineConfig::from_yaml_str(YAML).unwrap();
        let first = config.sources[0].fetch_range(&config.period).unwrap();
        assert_eq!(first.end, config.sources[0].valid_range.unwrap().end);
        assert_eq!(config.sources[1].fetch_range(&config.period), Some(config.period));
    }

    #[test]
    fn test_reversed_period_rejected() {
        let yaml = YAML.replace("2021-01-01T00:00:00Z", "2019-01-01T00:00:00Z");
        let config = PipelineConfig::from_yaml_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(AnalysisError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_multiplier_rejected_at_parse() {
        let yaml = YAML.replace("multiplier: 0.01", "multiplier: 0");
        assert!(PipelineConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_duplicate_source_ids_rejected() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        config.sources[1].id = "avhrr".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SST_THRESHOLD", "30.148"),
            ("SST_MAX_RETRIES", "1"),
            ("SST_PERIOD", "2019-01-01/2020-01-01"),
        ]);
        let config = PipelineConfig::from_yaml_str(YAML)
            .unwrap()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.threshold, Some(30.148));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.period.to_string().split('/').count(), 2);
        assert!(config.period.start < config.period.end);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_ignored() {
        let config = PipelineConfig::from_yaml_str(YAML)
            .unwrap()
            .with_overrides(|key| (key == "SST_THRESHOLD").then(|| "warm".to_string()));
        assert!(config.threshold.is_none());
    }
}
