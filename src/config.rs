//! Extractor configuration: timescales, table bounds, flow table locking, logging.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Decay rates (λ), one statistic window per entry
    pub timescales: Vec<f64>,
    /// Upper bound on streams per database; `None` leaves it to the deployment
    pub max_streams: Option<usize>,
    /// Multiplier applied to packet sizes before accumulation (1e-6 for megabytes)
    pub size_scale: f64,
    /// Constrained-domain flow table
    pub flow_table: FlowTableConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTableConfig {
    /// Maximum number of flow records
    pub max_entries: usize,
    /// Bound on any lock acquisition (microseconds)
    pub lock_timeout_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

/// 100ms, 500ms, 1.5s, 10s and 1min windows.
pub const DEFAULT_TIMESCALES: [f64; 5] = [5.0, 3.0, 1.0, 0.1, 0.01];

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timescales: DEFAULT_TIMESCALES.to_vec(),
            max_streams: None,
            size_scale: 1.0,
            flow_table: FlowTableConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        Self {
            max_entries: 5000,
            lock_timeout_us: 50,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl ExtractorConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<ExtractorConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timescales.is_empty() {
            return Err(ConfigError::NoTimescales);
        }
        if let Some(&bad) = self
            .timescales
            .iter()
            .find(|l| !l.is_finite() || **l < 0.0)
        {
            return Err(ConfigError::InvalidTimescale(bad));
        }
        if !self.size_scale.is_finite() || self.size_scale <= 0.0 {
            return Err(ConfigError::InvalidSizeScale(self.size_scale));
        }
        if self.flow_table.max_entries == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.flow_table.lock_timeout_us)
    }
}
